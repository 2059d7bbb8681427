//! Product catalog entry.

use serde::{Deserialize, Serialize};

use super::errors::{LogisticsError, LogisticsResult};
use super::ids::ProductId;

/// Default shelf life in days when a product does not declare one.
pub const DEFAULT_EXPIRY_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub qr_code: String,
    pub expiry_days: u32,

    /// Coarse delivered-pallet counter used by reports. Not the sum of
    /// location inventories.
    #[serde(default)]
    pub stock: u64,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: &str,
        qr_code: impl Into<String>,
        expiry_days: u32,
    ) -> LogisticsResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LogisticsError::InvalidInput(
                "product name must not be blank".into(),
            ));
        }
        check_expiry_days(expiry_days)?;
        Ok(Self {
            id,
            name: name.to_string(),
            qr_code: qr_code.into(),
            expiry_days,
            stock: 0,
        })
    }

    /// Uniqueness key: trimmed, lowercased name.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn check_expiry_days(days: u32) -> LogisticsResult<()> {
    if days == 0 {
        return Err(LogisticsError::InvalidInput(
            "expiry days must be positive".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn name_is_trimmed_and_normalized() {
        let p = Product::new(ProductId::from_ulid(Ulid::new()), "  Süt 1L ", "SUT1L_X", 10).unwrap();
        assert_eq!(p.name, "Süt 1L");
        assert_eq!(p.normalized_name(), "süt 1l");
        assert_eq!(p.stock, 0);
    }

    #[test]
    fn blank_name_and_zero_expiry_are_rejected() {
        let id = ProductId::from_ulid(Ulid::new());
        assert!(Product::new(id, "   ", "X", 10).is_err());
        assert!(matches!(
            Product::new(id, "Ayran", "X", 0),
            Err(LogisticsError::InvalidInput(_))
        ));
    }
}
