/// Application name
pub const APP_NAME: &str = "tether";

/// Namespace prefix that distinguishes group ids from relay-assigned peer ids
pub const GROUP_ID_PREFIX: &str = "group_";

/// Label of the ordered data channel opened by the offering side
pub const DATA_CHANNEL_LABEL: &str = "chat";

/// Maximum size of one binary file chunk on the data channel (16 KiB)
pub const FILE_CHUNK_SIZE: usize = 16_384;

/// Delay between consecutive chunks, in milliseconds
pub const FILE_CHUNK_DELAY_MS: u64 = 50;

/// Progress is reported each time a transfer crosses one of this many steps
pub const PROGRESS_STEPS: u64 = 10;

/// ICE candidates held for a session that has no remote description yet
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Default signaling relay endpoint
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3000/ws";

/// Default STUN server
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Default directory for received files
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
