//! One-time codes for the second factor: recovery codes and emailed codes.
//!
//! Only digests are stored on the user. Digests are bound to the user id, so a
//! digest copied to another account does not verify there.

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tessera_common::{id::UserId, user::PendingEmailCode};
use time::OffsetDateTime;

/// Number of recovery codes issued per enrollment.
pub const RECOVERY_CODE_COUNT: usize = 10;

const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;

/// No `0`, `O`, `1` or `I`. 32 symbols, so `byte % 32` is unbiased.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const EMAIL_CODE_DIGITS: usize = 6;

/// Generate a fresh batch of recovery codes in display form (`ABCD-EFGH-JKLM`).
pub fn generate_recovery_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            let mut raw = [0u8; RECOVERY_CODE_LEN];
            rng.fill_bytes(&mut raw);
            let normalized: String = raw
                .iter()
                .map(|byte| {
                    RECOVERY_CODE_ALPHABET[usize::from(*byte) % RECOVERY_CODE_ALPHABET.len()]
                        as char
                })
                .collect();
            format_recovery_code(&normalized)
        })
        .collect()
}

/// Normalize user input: drop separators and whitespace, uppercase.
///
/// Returns `None` if the result cannot be a recovery code.
pub fn normalize_recovery_code(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN
        || !normalized
            .bytes()
            .all(|byte| RECOVERY_CODE_ALPHABET.contains(&byte))
    {
        return None;
    }

    Some(normalized)
}

fn format_recovery_code(normalized: &str) -> String {
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, ch) in normalized.chars().enumerate() {
        if idx > 0 && idx % RECOVERY_CODE_GROUP_SIZE == 0 {
            out.push('-');
        }
        out.push(ch);
    }
    out
}

/// The stored digest of a recovery code.
pub fn hash_recovery_code(user_id: UserId, code: &str) -> Option<String> {
    normalize_recovery_code(code).map(|normalized| digest(user_id, &normalized))
}

/// Consume a recovery code: if `input` matches one of `hashes`, remove it and return true.
pub fn redeem_recovery_code(hashes: &mut Vec<String>, user_id: UserId, input: &str) -> bool {
    let Some(candidate) = hash_recovery_code(user_id, input) else {
        return false;
    };

    match hashes.iter().position(|stored| constant_time_eq(stored, &candidate)) {
        Some(idx) => {
            hashes.remove(idx);
            true
        }
        None => false,
    }
}

/// Generate a numeric email code.
pub fn generate_email_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10u32.pow(EMAIL_CODE_DIGITS as u32));
    format!("{n:0width$}", width = EMAIL_CODE_DIGITS)
}

/// The pending state to store on the user after sending `code`.
pub fn pending_email_code(user_id: UserId, code: &str, expires_at: OffsetDateTime) -> PendingEmailCode {
    PendingEmailCode {
        code_hash: digest(user_id, code.trim()),
        expires_at,
    }
}

/// Whether `input` matches the pending code and the code is still valid at `now`.
pub fn verify_email_code(
    pending: &PendingEmailCode,
    user_id: UserId,
    input: &str,
    now: OffsetDateTime,
) -> bool {
    if pending.expires_at <= now {
        return false;
    }
    constant_time_eq(&pending.code_hash, &digest(user_id, input.trim()))
}

fn digest(user_id: UserId, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_bytes());
    hasher.update(code.as_bytes());
    hexhex::hex(&hasher.finalize()).to_string()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
