// ─── Identity ───
// Offline and licensed identities, the persisted identity record and the
// browser login that produces it.

pub mod microsoft;
pub mod session;
pub mod store;
pub mod surface;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use session::{AuthSession, AuthState, LoginSurface};
pub use store::IdentityStore;
pub use surface::ConsoleLoginSurface;

/// Microsoft public client used by the desktop login page.
pub const MICROSOFT_CLIENT_ID: &str = "000000004C12AE6F";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    #[default]
    Offline,
    Licensed,
}

/// Account data saved after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "uuid")]
    pub account_id: String,
    #[serde(rename = "username")]
    pub display_name: String,
}

/// Identity handed to the command builder for one run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub username: String,
    pub client_id: String,
    /// Empty for offline play.
    pub auth_token: String,
    pub licensed: bool,
}

impl LaunchOptions {
    /// Fresh offline identity: random account id, no token.
    pub fn offline(username: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            auth_token: String::new(),
            licensed: false,
        }
    }

    pub fn licensed(record: &IdentityRecord) -> Self {
        Self {
            username: record.display_name.clone(),
            client_id: record.account_id.clone(),
            auth_token: record.access_token.clone(),
            licensed: true,
        }
    }
}

const ADJECTIVES: &[&str] = &[
    "Swift", "Brave", "Quiet", "Lucky", "Clever", "Mighty", "Sneaky", "Happy", "Frosty",
    "Shadow", "Rusty", "Golden",
];

const NOUNS: &[&str] = &[
    "Creeper", "Miner", "Fox", "Golem", "Builder", "Wolf", "Ocelot", "Piglin", "Drake",
    "Axolotl", "Warden", "Crafter",
];

/// Random offline name: adjective, noun and two or three digits.
pub fn generate_username() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Swift");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Miner");
    let number: u32 = rng.gen_range(10..1000);
    format!("{}{}{}", adjective, noun, number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_usernames_are_valid_player_names() {
        for _ in 0..50 {
            let name = generate_username();
            assert!(!name.is_empty());
            assert!(name.len() <= 16, "{name}");
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric()), "{name}");
            assert!(name.chars().last().unwrap().is_ascii_digit());
        }
    }

    #[test]
    fn record_uses_launcher_file_keys() {
        let record = IdentityRecord {
            access_token: "tok".into(),
            account_id: "abc".into(),
            display_name: "Steve".into(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"accessToken": "tok", "uuid": "abc", "username": "Steve"})
        );
    }

    #[test]
    fn record_accepts_legacy_token_key() {
        let record: IdentityRecord = serde_json::from_value(serde_json::json!({
            "access_token": "old", "uuid": "u", "username": "Alex"
        }))
        .unwrap();
        assert_eq!(record.access_token, "old");
    }

    #[test]
    fn offline_options_have_no_token_and_a_fresh_id() {
        let a = LaunchOptions::offline(" Steve ");
        let b = LaunchOptions::offline("Steve");
        assert_eq!(a.username, "Steve");
        assert!(a.auth_token.is_empty());
        assert!(!a.licensed);
        assert_ne!(a.client_id, b.client_id);
        assert!(uuid::Uuid::parse_str(&a.client_id).is_ok());
    }
}
