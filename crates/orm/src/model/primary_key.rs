//! Primary Key System - identifier value types and generation strategies
//!
//! The identifier of a model lives in an `Option` on the instance: `None`
//! until the engine or the caller assigns it, never a sentinel zero.

use std::fmt;

use uuid::Uuid;

use super::field::FieldValue;
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// Broad class of an identifier value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Integral,
    Uuid,
    Text,
    Other,
}

/// Value type usable as a model identifier
pub trait Identifier: FieldValue + PartialEq + fmt::Debug {
    fn identifier_kind() -> IdentifierKind;

    /// A fresh 128-bit random value, when the type can hold one
    fn generate_random() -> Option<Self> {
        None
    }
}

impl Identifier for i64 {
    fn identifier_kind() -> IdentifierKind {
        IdentifierKind::Integral
    }
}

impl Identifier for i32 {
    fn identifier_kind() -> IdentifierKind {
        IdentifierKind::Integral
    }
}

impl Identifier for Uuid {
    fn identifier_kind() -> IdentifierKind {
        IdentifierKind::Uuid
    }

    fn generate_random() -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl Identifier for String {
    fn identifier_kind() -> IdentifierKind {
        IdentifierKind::Text
    }

    fn generate_random() -> Option<Self> {
        Some(format!("{:032x}", rand::random::<u128>()))
    }
}

/// How the identifier of a new record is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierStrategy {
    /// The caller sets it before create
    UserSupplied,
    /// The engine generates a random value before create
    Random,
    /// The backend generates it during the insert
    DatabaseGenerated,
}

impl IdentifierStrategy {
    /// Strategy used when none is configured
    pub fn infer<I: Identifier>(schema: &str, key: &str) -> ModelResult<Self> {
        match I::identifier_kind() {
            IdentifierKind::Integral => Ok(IdentifierStrategy::DatabaseGenerated),
            _ => Err(ModelError::AmbiguousIdentifierStrategy {
                schema: schema.to_string(),
                key: key.to_string(),
            }),
        }
    }

    /// Check that the identifier type can honour this strategy
    pub fn validate<I: Identifier>(&self, schema: &str, key: &str) -> ModelResult<()> {
        if *self == IdentifierStrategy::Random && I::generate_random().is_none() {
            return Err(ModelError::UnsupportedIdentifierStrategy {
                schema: schema.to_string(),
                key: key.to_string(),
                strategy: *self,
            });
        }
        Ok(())
    }
}

/// What happened to the identifier of an instance during create
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierOutcome {
    /// The caller supplied it
    Supplied,
    /// The engine generated it
    Generated,
    /// Left for the backend to generate
    Pending,
    /// The backend generated it and reported it back
    Captured,
    /// The backend generated it but did not report it; the instance holds no identifier
    NotCaptured,
}

impl IdentifierOutcome {
    /// The instance holds its identifier after the operation
    pub fn is_known(&self) -> bool {
        !matches!(self, IdentifierOutcome::Pending | IdentifierOutcome::NotCaptured)
    }
}

/// Identifier key, strategy and accessors of model `M`
pub struct IdentifierDescriptor<M, I> {
    key: String,
    strategy: IdentifierStrategy,
    get: fn(&M) -> &Option<I>,
    get_mut: fn(&mut M) -> &mut Option<I>,
}

impl<M, I> Clone for IdentifierDescriptor<M, I> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            strategy: self.strategy,
            get: self.get,
            get_mut: self.get_mut,
        }
    }
}

impl<M, I> fmt::Debug for IdentifierDescriptor<M, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierDescriptor")
            .field("key", &self.key)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<M, I: Identifier> IdentifierDescriptor<M, I> {
    pub fn new(
        key: &str,
        strategy: IdentifierStrategy,
        get: fn(&M) -> &Option<I>,
        get_mut: fn(&mut M) -> &mut Option<I>,
    ) -> Self {
        Self {
            key: key.to_string(),
            strategy,
            get,
            get_mut,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn strategy(&self) -> IdentifierStrategy {
        self.strategy
    }

    pub fn get<'a>(&self, model: &'a M) -> Option<&'a I> {
        (self.get)(model).as_ref()
    }

    pub fn set(&self, model: &mut M, value: Option<I>) {
        *(self.get_mut)(model) = value;
    }

    pub fn encoded(&self, model: &M) -> Option<DatabaseValue> {
        self.get(model).map(FieldValue::encode_value)
    }

    /// Decode a stored identifier into the instance
    pub fn write(&self, model: &mut M, value: DatabaseValue) -> ModelResult<()> {
        let decoded = <Option<I>>::decode_value(value).map_err(|e| ModelError::InvalidFieldValue {
            key: self.key.clone(),
            message: e.to_string(),
        })?;
        self.set(model, decoded);
        Ok(())
    }

    /// Prepare the identifier of an instance about to be created
    pub fn assign(&self, schema: &str, model: &mut M) -> ModelResult<IdentifierOutcome> {
        if self.get(model).is_some() {
            return Ok(IdentifierOutcome::Supplied);
        }

        match self.strategy {
            IdentifierStrategy::UserSupplied => Err(ModelError::MissingIdentifier {
                schema: schema.to_string(),
            }),
            IdentifierStrategy::Random => {
                let value = I::generate_random().ok_or_else(|| {
                    ModelError::UnsupportedIdentifierStrategy {
                        schema: schema.to_string(),
                        key: self.key.clone(),
                        strategy: self.strategy,
                    }
                })?;
                self.set(model, Some(value));
                Ok(IdentifierOutcome::Generated)
            }
            IdentifierStrategy::DatabaseGenerated => Ok(IdentifierOutcome::Pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Ticket {
        id: Option<Uuid>,
        serial: Option<i64>,
        code: Option<String>,
    }

    #[test]
    fn test_inference_prefers_database_generation_for_integers() {
        assert_eq!(
            IdentifierStrategy::infer::<i64>("tickets", "serial").unwrap(),
            IdentifierStrategy::DatabaseGenerated
        );
        let err = IdentifierStrategy::infer::<Uuid>("tickets", "id").unwrap_err();
        assert!(matches!(err, ModelError::AmbiguousIdentifierStrategy { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_random_strategy_requires_a_generator() {
        assert!(IdentifierStrategy::Random.validate::<Uuid>("tickets", "id").is_ok());
        assert!(IdentifierStrategy::Random.validate::<String>("tickets", "code").is_ok());
        let err = IdentifierStrategy::Random
            .validate::<i64>("tickets", "serial")
            .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedIdentifierStrategy { .. }));
    }

    #[test]
    fn test_assign_per_strategy() {
        let random = IdentifierDescriptor::new(
            "id",
            IdentifierStrategy::Random,
            |t: &Ticket| &t.id,
            |t: &mut Ticket| &mut t.id,
        );
        let mut ticket = Ticket::default();
        assert_eq!(random.assign("tickets", &mut ticket).unwrap(), IdentifierOutcome::Generated);
        let generated = ticket.id.expect("generated id");
        assert_eq!(random.assign("tickets", &mut ticket).unwrap(), IdentifierOutcome::Supplied);
        assert_eq!(ticket.id, Some(generated));

        let supplied = IdentifierDescriptor::new(
            "code",
            IdentifierStrategy::UserSupplied,
            |t: &Ticket| &t.code,
            |t: &mut Ticket| &mut t.code,
        );
        let err = supplied.assign("tickets", &mut Ticket::default()).unwrap_err();
        assert!(matches!(err, ModelError::MissingIdentifier { .. }));
        assert!(err.is_validation());

        let database = IdentifierDescriptor::new(
            "serial",
            IdentifierStrategy::DatabaseGenerated,
            |t: &Ticket| &t.serial,
            |t: &mut Ticket| &mut t.serial,
        );
        let mut ticket = Ticket::default();
        assert_eq!(database.assign("tickets", &mut ticket).unwrap(), IdentifierOutcome::Pending);
        assert!(ticket.serial.is_none());
    }

    #[test]
    fn test_random_strings_are_128_bit_hex() {
        let a = String::generate_random().unwrap();
        let b = String::generate_random().unwrap();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
