use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mekgoro_core::{ActorId, ItemKey, LedgerError, LedgerResult, MovementId};

/// Kind of quantity-changing event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Receive,
    Dispatch,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receive => "RECEIVE",
            MovementKind::Dispatch => "DISPATCH",
            MovementKind::Adjustment => "ADJUSTMENT",
        }
    }

    fn check_sign(&self, delta: i64) -> LedgerResult<()> {
        if delta == 0 {
            return Err(LedgerError::invalid_input("delta cannot be zero"));
        }
        if delta == i64::MIN {
            return Err(LedgerError::invalid_input("delta out of range"));
        }
        match self {
            MovementKind::Receive if delta < 0 => {
                Err(LedgerError::invalid_input("receive delta must be positive"))
            }
            MovementKind::Dispatch if delta > 0 => {
                Err(LedgerError::invalid_input("dispatch delta must be negative"))
            }
            _ => Ok(()),
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RECEIVE" => Ok(MovementKind::Receive),
            "DISPATCH" => Ok(MovementKind::Dispatch),
            "ADJUSTMENT" => Ok(MovementKind::Adjustment),
            other => Err(LedgerError::invalid_input(format!("unknown movement kind '{other}'"))),
        }
    }
}

/// Who/where/when of a movement, shared by every movement kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementMeta {
    /// Delivery note, PO number or other document reference.
    pub reference: String,
    /// Supplier on receive, client or site on dispatch.
    pub counterparty: String,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

impl MovementMeta {
    pub fn new(
        reference: impl Into<String>,
        counterparty: impl Into<String>,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reference: reference.into(),
            counterparty: counterparty.into(),
            actor,
            occurred_at,
        }
    }
}

/// A validated, not-yet-applied movement.
///
/// Construction enforces the sign rules of each kind, so holding a
/// `MovementRequest` means only the stock guard remains to be checked.
/// It is serializable for logging but never deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementRequest {
    kind: MovementKind,
    item_key: ItemKey,
    delta: i64,
    unit_cost: Option<u64>,
    meta: MovementMeta,
}

impl MovementRequest {
    /// General constructor: `delta` is signed and must agree with `kind`.
    pub fn new(kind: MovementKind, item_key: &str, delta: i64, meta: MovementMeta) -> LedgerResult<Self> {
        let item_key = ItemKey::parse(item_key)?;
        kind.check_sign(delta)?;
        Ok(Self {
            kind,
            item_key,
            delta,
            unit_cost: None,
            meta: MovementMeta {
                reference: meta.reference.trim().to_string(),
                counterparty: meta.counterparty.trim().to_string(),
                ..meta
            },
        })
    }

    /// Stock coming in; `quantity` must be positive.
    pub fn receive(item_key: &str, quantity: i64, meta: MovementMeta) -> LedgerResult<Self> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_input(format!(
                "quantity received must be positive, got {quantity}"
            )));
        }
        Self::new(MovementKind::Receive, item_key, quantity, meta)
    }

    /// Stock going out; `quantity` is the positive amount leaving and is negated here.
    pub fn dispatch(item_key: &str, quantity: i64, meta: MovementMeta) -> LedgerResult<Self> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_input(format!(
                "quantity dispatched must be positive, got {quantity}"
            )));
        }
        Self::new(MovementKind::Dispatch, item_key, -quantity, meta)
    }

    /// Stock-take correction in either direction.
    pub fn adjust(item_key: &str, delta: i64, meta: MovementMeta) -> LedgerResult<Self> {
        Self::new(MovementKind::Adjustment, item_key, delta, meta)
    }

    /// Attach the purchase cost (minor units) carried by a receipt.
    pub fn with_unit_cost(mut self, unit_cost: u64) -> LedgerResult<Self> {
        if self.kind != MovementKind::Receive {
            return Err(LedgerError::invalid_input("unit cost can only be recorded on receive"));
        }
        self.unit_cost = Some(unit_cost);
        Ok(self)
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn item_key(&self) -> &ItemKey {
        &self.item_key
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn unit_cost(&self) -> Option<u64> {
        self.unit_cost
    }

    pub fn meta(&self) -> &MovementMeta {
        &self.meta
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.meta.occurred_at
    }

    /// Quantity after applying this movement to `current`.
    ///
    /// Fails with `InsufficientStock` when the result would be negative.
    pub fn resulting_quantity(&self, current: i64) -> LedgerResult<i64> {
        let next = current
            .checked_add(self.delta)
            .ok_or_else(|| LedgerError::invalid_input("quantity overflow"))?;
        if next < 0 {
            return Err(LedgerError::insufficient_stock(
                self.item_key.as_str(),
                current,
                self.delta.saturating_neg(),
            ));
        }
        Ok(next)
    }

    /// Freeze this request into the log record the store assigned `id` to.
    pub fn into_record(self, id: MovementId) -> MovementRecord {
        MovementRecord {
            id,
            kind: self.kind,
            item_key: self.item_key,
            delta: self.delta,
            unit_cost: self.unit_cost,
            reference: self.meta.reference,
            counterparty: self.meta.counterparty,
            actor: self.meta.actor,
            occurred_at: self.meta.occurred_at,
        }
    }
}

/// Immutable, committed entry of the movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub kind: MovementKind,
    pub item_key: ItemKey,
    pub delta: i64,
    pub unit_cost: Option<u64>,
    pub reference: String,
    pub counterparty: String,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}
