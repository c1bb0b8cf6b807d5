//! Strongly typed entity identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Identifies an [`AssetNetwork`](crate::registry::AssetNetwork).
    NetworkId
);
entity_id!(
    /// Identifies an [`Asset`](crate::registry::Asset).
    AssetId
);
entity_id!(
    /// Identifies a ledger [`Account`](crate::ledger::Account).
    AccountId
);
entity_id!(
    /// Identifies a single ledger entry.
    TransactionId
);
entity_id!(
    /// Identifies a [`CryptoAddress`](crate::registry::CryptoAddress).
    AddressId
);
entity_id!(
    /// Identifies a [`CryptoAddressAccount`](crate::registry::CryptoAddressAccount).
    AddressAccountId
);
entity_id!(
    /// Identifies a [`CryptoOperation`](crate::operations::CryptoOperation).
    OperationId
);
