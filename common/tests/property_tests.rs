// Property-based tests for file selection, token caching, scheduling and
// callback verification

use chrono::{Duration as ChronoDuration, TimeZone, Timelike, Utc};
use common::callback::{compute_signature, CallbackCrypto};
use common::errors::CallbackError;
use common::models::{CallbackChallenge, CallbackSecrets};
use common::scanner::select_latest;
use common::schedule::{Frequency, Trigger};
use common::wecom::token::{AccessToken, EXPIRY_MARGIN_SECONDS};
use proptest::prelude::*;
use std::fs::File;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const AES_KEY: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";

// ============================================================================
// Latest-file selection
// ============================================================================

// For any set of visible files with distinct modification times, the selected
// file is the one modified last; a newer hidden file never wins.
#[test]
fn property_select_latest_picks_max_mtime() {
    proptest!(ProptestConfig::with_cases(32), |(
        names in prop::collection::btree_set("[a-z]{1,8}\\.txt", 1..8),
        newest_hidden in any::<bool>(),
        seed in any::<u64>(),
    )| {
        let dir = TempDir::new().unwrap();
        let names: Vec<String> = names.into_iter().collect();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        // Distinct offsets, permuted by the seed
        let count = names.len() as u64;
        let mut expected = None;
        let mut max_offset = 0;
        for (i, name) in names.iter().enumerate() {
            let offset = (i as u64 + seed) % count;
            let path = dir.path().join(name);
            let file = File::create(&path).unwrap();
            file.set_modified(base + Duration::from_secs(offset * 60)).unwrap();
            if expected.is_none() || offset > max_offset {
                max_offset = offset;
                expected = Some(path);
            }
        }

        if newest_hidden {
            let hidden = File::create(dir.path().join(".newest")).unwrap();
            hidden.set_modified(base + Duration::from_secs((count + 10) * 60)).unwrap();
        }

        prop_assert_eq!(select_latest(dir.path()), expected);
    });
}

// Equal modification times resolve to the smallest name
#[test]
fn property_select_latest_tie_break_is_stable() {
    proptest!(ProptestConfig::with_cases(16), |(
        names in prop::collection::btree_set("[a-z]{1,6}", 2..6),
    )| {
        let dir = TempDir::new().unwrap();
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for name in &names {
            File::create(dir.path().join(name)).unwrap().set_modified(stamp).unwrap();
        }

        let smallest: &String = names.iter().next().unwrap();
        prop_assert_eq!(select_latest(dir.path()), Some(dir.path().join(smallest)));
    });
}

// ============================================================================
// Access token window
// ============================================================================

// A token whose stated lifetime does not exceed the safety margin is never
// reusable; longer tokens are reusable until exactly `expires_in - margin`.
#[test]
fn property_token_reuse_window() {
    proptest!(|(
        expires_in in 0i64..100_000,
        issued_secs in 1_600_000_000i64..1_900_000_000,
    )| {
        let issued_at = Utc.timestamp_opt(issued_secs, 0).unwrap();
        let token = AccessToken::issued("t".to_string(), expires_in, issued_at).unwrap();

        if expires_in <= EXPIRY_MARGIN_SECONDS {
            prop_assert!(!token.is_valid_at(issued_at));
        } else {
            let window = expires_in - EXPIRY_MARGIN_SECONDS;
            prop_assert!(token.is_valid_at(issued_at));
            prop_assert!(token.is_valid_at(issued_at + ChronoDuration::seconds(window - 1)));
            prop_assert!(!token.is_valid_at(issued_at + ChronoDuration::seconds(window)));
        }
    });
}

// ============================================================================
// Schedule computation
// ============================================================================

#[test]
fn property_daily_trigger_fires_within_a_day_at_configured_time() {
    proptest!(|(
        hour in 0u32..24,
        minute in 0u32..60,
        now_secs in 1_600_000_000i64..1_900_000_000,
    )| {
        let trigger = Trigger::new(Frequency::Daily, &format!("{:02}:{:02}", hour, minute)).unwrap();
        let now = Utc.timestamp_opt(now_secs, 0).unwrap();
        let next = trigger.next_after(&now).unwrap();

        prop_assert!(next > now);
        prop_assert!(next - now <= ChronoDuration::days(1));
        prop_assert_eq!((next.hour(), next.minute(), next.second()), (hour, minute, 0));
    });
}

#[test]
fn property_hourly_trigger_fires_within_an_hour_at_configured_minute() {
    proptest!(|(
        hour in 0u32..24,
        minute in 0u32..60,
        now_secs in 1_600_000_000i64..1_900_000_000,
    )| {
        let trigger = Trigger::new(Frequency::Hourly, &format!("{:02}:{:02}", hour, minute)).unwrap();
        let now = Utc.timestamp_opt(now_secs, 0).unwrap();
        let next = trigger.next_after(&now).unwrap();

        prop_assert!(next > now);
        prop_assert!(next - now <= ChronoDuration::hours(1));
        prop_assert_eq!((next.minute(), next.second()), (minute, 0));
    });
}

// ============================================================================
// Callback verification
// ============================================================================

fn crypto() -> CallbackCrypto {
    CallbackCrypto::new(&CallbackSecrets {
        token: "prop-token".to_string(),
        aes_key: AES_KEY.to_string(),
        corp_id: "ww-prop".to_string(),
    })
    .unwrap()
}

// Any printable payload survives encrypt, sign, verify and decrypt unchanged
#[test]
fn property_valid_echo_decrypts_to_payload() {
    let crypto = crypto();
    proptest!(|(payload in "\\PC{0,200}", nonce in "[0-9]{1,10}")| {
        let echostr = crypto.encrypt(&payload).unwrap();
        let challenge = CallbackChallenge {
            msg_signature: crypto.sign("1700000000", &nonce, &echostr),
            timestamp: "1700000000".to_string(),
            nonce,
            echostr,
        };
        prop_assert_eq!(crypto.verify_and_decrypt(&challenge).unwrap(), payload);
    });
}

// Changing any single ciphertext byte invalidates the signed request
#[test]
fn property_mutated_ciphertext_is_rejected() {
    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;
    let crypto = crypto();

    proptest!(|(
        payload in "[a-zA-Z0-9]{1,64}",
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    )| {
        let echostr = crypto.encrypt(&payload).unwrap();
        let signature = compute_signature("prop-token", "1700000000", "7", &echostr);

        let mut bytes = engine.decode(&echostr).unwrap();
        let at = position.index(bytes.len());
        bytes[at] ^= flip;
        let tampered = engine.encode(&bytes);

        let challenge = CallbackChallenge {
            msg_signature: signature,
            timestamp: "1700000000".to_string(),
            nonce: "7".to_string(),
            echostr: tampered,
        };
        prop_assert_eq!(
            crypto.verify_and_decrypt(&challenge),
            Err(CallbackError::InvalidSignature)
        );
    });
}
