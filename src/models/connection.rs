//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores the OAuth grant for an (account, provider) pair.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Provider slug for Google Business Profile, the only provider this
/// service currently syncs.
pub const PROVIDER_GOOGLE_BUSINESS: &str = "google_business";

/// Connection entity representing an account-scoped OAuth authorization
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Account this connection belongs to
    pub account_id: Uuid,

    /// Provider slug (always `google_business` today)
    pub provider: String,

    /// Status of the connection (active|revoked|error)
    pub status: String,

    /// Encrypted access token ciphertext
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token ciphertext
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// OAuth token type as granted by the provider
    pub token_type: String,

    /// Granted scope string
    pub scope: Option<String>,

    /// Access token expiry timestamp
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Last refresh/probe error message, if any
    pub last_error: Option<String>,

    /// Monotonic revision, bumped on every token mutation. Conditional
    /// updates on this column serialize concurrent refreshes.
    pub revision: i32,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
