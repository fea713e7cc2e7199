use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Characters a room code can be made of. Uppercase only, to keep codes
/// easy to read back over voice chat.
pub const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a room code.
pub const ROOM_CODE_LENGTH: usize = 6;

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Falls back to a default label when a client-supplied string is blank.
pub(crate) fn non_blank(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Samples a single room code candidate. Uniqueness is the registry's job.
pub fn room_code() -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .take(ROOM_CODE_LENGTH)
        .collect()
}
