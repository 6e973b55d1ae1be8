use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Failures surfaced by a repository implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A uniqueness or integrity constraint rejected the write.
    #[error("integrity violation: {0}")]
    Conflict(String),

    /// A delete was blocked by rows that still reference the target.
    #[error("cannot delete: {0}")]
    Protected(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Attribute-selection failures for a product variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VariantError {
    #[error("multiple values provided for attribute ID {attribute_id}; select only one value per attribute")]
    DuplicateAttributeSelection { attribute_id: i64 },

    #[error("missing attribute values for required attributes with IDs: {attribute_ids:?}")]
    MissingRequiredAttributes { attribute_ids: Vec<i64> },

    #[error("unknown attribute value IDs: {attribute_value_ids:?}")]
    UnknownAttributeValues { attribute_value_ids: Vec<i64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Variant(#[from] VariantError),

    #[error("requested quantity {requested} exceeds available stock {available} for variant {variant_id}")]
    QuantityExceedsStock {
        variant_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },
}

impl ValidationError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Field {
            field,
            message: message.into(),
        }
    }

    /// Request field the failure is attributed to.
    #[must_use]
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Variant(_) => "attribute_ids",
            Self::QuantityExceedsStock { .. } => "quantity",
            Self::Field { field, .. } => *field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid OTP")]
    NoSuchOtp,

    #[error("OTP has expired")]
    OtpExpired,

    #[error("authentication credentials were not provided")]
    MissingCredentials,

    #[error("malformed authorization header")]
    MalformedAuthorizationHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("user is inactive or no longer exists")]
    InactiveUser,

    #[error("you do not have permission to perform this action")]
    Forbidden,
}

/// Error type returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<VariantError> for ServiceError {
    fn from(e: VariantError) -> Self {
        Self::Validation(ValidationError::Variant(e))
    }
}
