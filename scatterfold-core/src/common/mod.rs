use rand::{distributions::Alphanumeric, Rng};

/// Length of the key identifying one dispatching call.
const ROUTING_KEY_LEN: usize = 8;

pub fn get_random_routing_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROUTING_KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn routing_keys_are_alphanumeric() {
        let key = get_random_routing_key();
        assert_eq!(key.len(), ROUTING_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, get_random_routing_key());
    }
}
