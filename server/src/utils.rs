use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use shared::entity::MAX_NAME_LENGTH;

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Alternative usernames offered alongside a `username_taken` response.
/// The base is truncated so every suggestion stays within the name length
/// limit.
pub fn name_suggestions(name: &str) -> Vec<String> {
    let base: String = name.chars().take(MAX_NAME_LENGTH - 3).collect();
    let mut rng = rand::thread_rng();
    vec![
        format!("{}{}", base, rng.gen_range(2..10)),
        format!("{}_{}", base, rng.gen_range(10..100)),
        format!("{}{}", base, rng.gen_range(100..1000)),
    ]
}
