//! Pallet set: the individually coded pallets of one task.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{LogisticsError, LogisticsResult};

/// Pallet micro-status.
///
/// State transitions (forward only, no skipping):
/// - Waiting -> OnForklift -> Delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PalletStatus {
    #[serde(rename = "beklemede")]
    Waiting,

    #[serde(rename = "forklift_üstünde")]
    OnForklift,

    #[serde(rename = "teslim_edildi")]
    Delivered,
}

impl PalletStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PalletStatus::Waiting => "beklemede",
            PalletStatus::OnForklift => "forklift_üstünde",
            PalletStatus::Delivered => "teslim_edildi",
        }
    }

    /// The only status this one may move to.
    pub fn next(self) -> Option<PalletStatus> {
        match self {
            PalletStatus::Waiting => Some(PalletStatus::OnForklift),
            PalletStatus::OnForklift => Some(PalletStatus::Delivered),
            PalletStatus::Delivered => None,
        }
    }
}

impl fmt::Display for PalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pallet {
    pub code: String,
    pub status: PalletStatus,
}

impl Pallet {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: PalletStatus::Waiting,
        }
    }

    fn advance(&mut self, to: PalletStatus) -> LogisticsResult<()> {
        if self.status.next() != Some(to) {
            return Err(LogisticsError::verification_failed(format!(
                "pallet {} is {}, cannot become {}",
                self.code, self.status, to
            )));
        }
        self.status = to;
        Ok(())
    }
}

/// Ordered pallets owned by exactly one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PalletSet {
    pallets: Vec<Pallet>,
}

impl PalletSet {
    pub fn from_codes(codes: impl IntoIterator<Item = String>) -> Self {
        Self {
            pallets: codes.into_iter().map(Pallet::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pallets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pallet> {
        self.pallets.iter()
    }

    pub fn get(&self, code: &str) -> Option<&Pallet> {
        self.pallets.iter().find(|p| p.code == code)
    }

    pub fn count(&self, status: PalletStatus) -> usize {
        self.pallets.iter().filter(|p| p.status == status).count()
    }

    pub fn all_delivered(&self) -> bool {
        !self.pallets.is_empty() && self.count(PalletStatus::Delivered) == self.pallets.len()
    }

    /// Pallet scan: a waiting pallet goes onto the forklift.
    pub fn load_onto_forklift(&mut self, code: &str) -> LogisticsResult<()> {
        let pallet = self
            .pallets
            .iter_mut()
            .find(|p| p.code == code)
            .ok_or_else(|| LogisticsError::verification_failed(format!("unknown pallet code {code}")))?;
        if pallet.status != PalletStatus::Waiting {
            return Err(LogisticsError::verification_failed(format!(
                "pallet {code} was already scanned ({})",
                pallet.status
            )));
        }
        pallet.advance(PalletStatus::OnForklift)
    }

    /// Delivery scan: every pallet on the forklift is delivered.
    /// Waiting pallets are left alone. Returns how many were delivered.
    pub fn deliver_forklift_load(&mut self) -> LogisticsResult<usize> {
        let mut delivered = 0;
        for pallet in self
            .pallets
            .iter_mut()
            .filter(|p| p.status == PalletStatus::OnForklift)
        {
            pallet.advance(PalletStatus::Delivered)?;
            delivered += 1;
        }
        if delivered == 0 {
            return Err(LogisticsError::verification_failed(
                "no pallet is on the forklift",
            ));
        }
        Ok(delivered)
    }

    /// Marks every remaining pallet delivered, stepping through each status.
    /// Used when a task is completed by an explicit admin action.
    pub fn deliver_all(&mut self) {
        for pallet in &mut self.pallets {
            while let Some(next) = pallet.status.next() {
                pallet.status = next;
            }
        }
    }

    /// Grows or shrinks the set to `quantity` pallets without touching the
    /// status of pallets that stay.
    ///
    /// New pallets start with `fresh_status`. Only trailing pallets still in
    /// `fresh_status` can be dropped, newest first.
    pub fn resize(
        &mut self,
        quantity: usize,
        new_codes: Vec<String>,
        fresh_status: PalletStatus,
    ) -> LogisticsResult<()> {
        if quantity >= self.pallets.len() {
            let missing = quantity - self.pallets.len();
            if new_codes.len() != missing {
                return Err(LogisticsError::InvalidInput(format!(
                    "expected {missing} new pallet codes, got {}",
                    new_codes.len()
                )));
            }
            self.pallets.extend(new_codes.into_iter().map(|code| Pallet {
                code,
                status: fresh_status,
            }));
            return Ok(());
        }

        let surplus = self.pallets.len() - quantity;
        let droppable = self
            .pallets
            .iter()
            .rev()
            .take_while(|p| p.status == fresh_status)
            .count();
        if droppable < surplus {
            return Err(LogisticsError::InvalidInput(format!(
                "cannot drop {surplus} pallets: only {droppable} trailing pallets are unscanned"
            )));
        }
        self.pallets.truncate(quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn set_of(n: usize) -> PalletSet {
        PalletSet::from_codes((1..=n).map(|i| format!("P{i}")))
    }

    #[test]
    fn new_pallets_wait() {
        let set = set_of(3);
        assert_eq!(set.count(PalletStatus::Waiting), 3);
        assert!(!set.all_delivered());
    }

    #[test]
    fn pallet_scan_moves_to_forklift_once() {
        let mut set = set_of(2);
        set.load_onto_forklift("P1").unwrap();
        assert_eq!(set.get("P1").unwrap().status, PalletStatus::OnForklift);

        let again = set.load_onto_forklift("P1");
        assert!(matches!(again, Err(LogisticsError::VerificationFailed { .. })));
    }

    #[test]
    fn unknown_pallet_is_rejected() {
        let mut set = set_of(2);
        assert!(matches!(
            set.load_onto_forklift("nope"),
            Err(LogisticsError::VerificationFailed { .. })
        ));
    }

    #[test]
    fn delivery_only_touches_forklift_pallets() {
        let mut set = set_of(3);
        set.load_onto_forklift("P1").unwrap();
        set.load_onto_forklift("P3").unwrap();

        assert_eq!(set.deliver_forklift_load().unwrap(), 2);
        assert_eq!(set.get("P2").unwrap().status, PalletStatus::Waiting);
        assert_eq!(set.count(PalletStatus::Delivered), 2);
        assert!(!set.all_delivered());
    }

    #[test]
    fn delivery_without_forklift_load_fails() {
        let mut set = set_of(1);
        assert!(set.deliver_forklift_load().is_err());
    }

    #[test]
    fn delivered_pallet_cannot_be_rescanned() {
        let mut set = set_of(1);
        set.load_onto_forklift("P1").unwrap();
        set.deliver_forklift_load().unwrap();
        assert!(set.load_onto_forklift("P1").is_err());
        assert!(set.all_delivered());
    }

    #[rstest]
    #[case::waiting(PalletStatus::Waiting, Some(PalletStatus::OnForklift))]
    #[case::forklift(PalletStatus::OnForklift, Some(PalletStatus::Delivered))]
    #[case::delivered(PalletStatus::Delivered, None)]
    fn status_moves_one_step_forward(
        #[case] from: PalletStatus,
        #[case] expected: Option<PalletStatus>,
    ) {
        assert_eq!(from.next(), expected);
    }

    #[test]
    fn resize_keeps_scanned_pallets() {
        let mut set = set_of(3);
        set.load_onto_forklift("P1").unwrap();

        set.resize(2, Vec::new(), PalletStatus::Waiting).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("P1").unwrap().status, PalletStatus::OnForklift);

        set.resize(4, vec!["N1".into(), "N2".into()], PalletStatus::Waiting)
            .unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.get("N2").unwrap().status, PalletStatus::Waiting);
    }

    #[test]
    fn resize_refuses_to_drop_scanned_pallets() {
        let mut set = set_of(2);
        set.load_onto_forklift("P2").unwrap();
        assert!(set.resize(1, Vec::new(), PalletStatus::Waiting).is_err());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn serializes_with_original_status_names() {
        let set = set_of(1);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json[0]["status"], "beklemede");
    }
}
