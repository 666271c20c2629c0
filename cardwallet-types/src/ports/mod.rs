//! Port traits (interfaces for adapters).
//!
//! The application layer depends on these traits, not concrete implementations.

mod card_provider;
mod repository;

pub use card_provider::{
    CardDetail, CardFunded, CardProviderClient, CardStatusChanged, IssueCardRequest, IssuedCard,
    ProviderError,
};
pub use repository::LedgerRepository;
