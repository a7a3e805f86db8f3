/// Maximum message length in characters
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Maximum group chat name length in characters
pub const MAX_GROUP_NAME_LEN: usize = 64;

/// Maximum display name length in characters
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Maximum avatar size in bytes (2 MiB)
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// How often a command re-reads and re-validates after a conflicting commit
pub const MAX_COMMIT_RETRIES: u32 = 3;

/// PNG file signature
pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// JPEG start-of-image marker
pub const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
