/// Maximum size for a single plaintext message body in bytes.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 8 * 1024;
/// Default capacity of a conversation's snapshot broadcast channel.
pub const DEFAULT_SNAPSHOT_BUFFER: usize = 64;
/// Author id used when a message carries no sender identity.
pub const UNKNOWN_AUTHOR_ID: &str = "unknown";
/// Display name used when a message carries no sender name.
pub const UNKNOWN_AUTHOR_NAME: &str = "Unknown";
/// Role used when a message carries no sender role.
pub const DEFAULT_AUTHOR_ROLE: &str = "User";
