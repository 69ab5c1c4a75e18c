use crate::ledger::normalize::MovementRecord;
use crate::models::StockInput;
use crate::utils::coerce_number;

/// Quantities in the two unit bases tracked side by side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StockPair {
    pub ambient: f64,
    pub standard: f64,
}

impl StockPair {
    pub fn new(ambient: f64, standard: f64) -> Self {
        Self { ambient, standard }
    }

    /// Missing input or missing halves default to zero.
    pub fn from_input(input: Option<&StockInput>) -> Self {
        match input {
            Some(input) => Self {
                ambient: coerce_number(input.amb.as_ref()),
                standard: coerce_number(input.vinte.as_ref()),
            },
            None => Self::default(),
        }
    }
}

/// Cumulative balance carried forward record by record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningBalance {
    current: StockPair,
}

impl RunningBalance {
    pub fn new(opening: StockPair) -> Self {
        Self { current: opening }
    }

    /// Apply one movement and return the post-update balance.
    pub fn apply(&mut self, record: &MovementRecord) -> StockPair {
        self.current.ambient += record.in_ambient - record.out_ambient;
        self.current.standard += record.in_standard - record.out_standard;
        self.current
    }

    pub fn current(&self) -> StockPair {
        self.current
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub record: MovementRecord,
    pub balance: StockPair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalancedLedger {
    pub opening: StockPair,
    pub rows: Vec<LedgerRow>,
    pub closing: StockPair,
}

impl BalancedLedger {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fold records in the order given. The caller is responsible for ordering.
pub fn accumulate(opening: StockPair, records: Vec<MovementRecord>) -> BalancedLedger {
    let mut running = RunningBalance::new(opening);
    let rows = records
        .into_iter()
        .map(|record| {
            let balance = running.apply(&record);
            LedgerRow { record, balance }
        })
        .collect();

    BalancedLedger {
        opening,
        rows,
        closing: running.current(),
    }
}
