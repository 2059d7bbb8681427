//! CodeGenerator port - QR に載せるコードの生成
//!
//! パレットコードは「製品 QR + 生産番号 + 連番 + 行き先名 + 時刻 + 乱数」。
//! 一意性は best-effort（乱数 suffix 頼み）で、衝突検出はしません。

use chrono::{DateTime, Utc};
use rand::Rng;

/// Pallet code request for one task.
#[derive(Debug, Clone, Copy)]
pub struct PalletCodeRequest<'a> {
    pub product_qr_code: &'a str,
    pub production_number: u64,
    pub destination_name: &'a str,
    /// 1-based sequence number of the first pallet.
    pub first_sequence: usize,
    pub count: usize,
}

pub trait CodeGenerator: Send + Sync {
    fn pallet_codes(&self, request: PalletCodeRequest<'_>, now: DateTime<Utc>) -> Vec<String>;

    /// Product QR code: the name's ASCII alphanumerics, uppercased, plus a
    /// base-36 timestamp.
    fn product_code(&self, name: &str, now: DateTime<Utc>) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodeGenerator;

impl CodeGenerator for DefaultCodeGenerator {
    fn pallet_codes(&self, request: PalletCodeRequest<'_>, now: DateTime<Utc>) -> Vec<String> {
        let timestamp = now.timestamp_millis();
        let mut rng = rand::thread_rng();
        (request.first_sequence..request.first_sequence + request.count)
            .map(|seq| {
                let suffix = to_base36(rng.r#gen::<u64>());
                format!(
                    "{}_{}_{}_{}_{}_{}",
                    request.product_qr_code,
                    request.production_number,
                    seq,
                    request.destination_name,
                    timestamp,
                    suffix
                )
            })
            .collect()
    }

    fn product_code(&self, name: &str, now: DateTime<Utc>) -> String {
        let clean: String = name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let millis = now.timestamp_millis().max(0) as u64;
        format!("{clean}_{}", to_base36(millis))
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn pallet_codes_carry_every_component() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap();
        let codes = DefaultCodeGenerator.pallet_codes(
            PalletCodeRequest {
                product_qr_code: "AYRAN_LX1",
                production_number: 42,
                destination_name: "Depo A",
                first_sequence: 1,
                count: 3,
            },
            now,
        );
        assert_eq!(codes.len(), 3);
        let prefix = format!("AYRAN_LX1_42_2_Depo A_{}_", now.timestamp_millis());
        assert!(codes[1].starts_with(&prefix), "{}", codes[1]);
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn product_code_strips_non_alphanumerics() {
        let now = Utc.timestamp_millis_opt(36 * 36).unwrap();
        assert_eq!(
            DefaultCodeGenerator.product_code("Süt 1 L", now),
            "ST1L_100"
        );
    }

    #[test]
    fn base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
