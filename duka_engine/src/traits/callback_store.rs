use crate::{
    db_types::{CallbackEntry, CallbackOutcome, InsertCallbackResult, NewCallbackEntry},
    engine_api::errors::PaymentError,
};

/// The append-only log of observed payment outcomes.
#[allow(async_fn_in_trait)]
pub trait CallbackStore {
    /// Logs the entry with outcome `received`, unless an entry with the same correlation id, result code and payload
    /// hash exists, in which case the existing entry is returned and nothing is written.
    async fn record_callback(&self, entry: NewCallbackEntry) -> Result<InsertCallbackResult, PaymentError>;

    /// Records how processing of the entry ended. Once an entry has a final outcome it is kept, except that
    /// `applied` replaces any other outcome. Returns false if the entry was left as it was.
    async fn update_callback_outcome(
        &self,
        id: i64,
        outcome: CallbackOutcome,
        error: Option<&str>,
    ) -> Result<bool, PaymentError>;

    /// Log entries for a correlation id, oldest first.
    async fn fetch_callbacks(&self, correlation_id: &str) -> Result<Vec<CallbackEntry>, PaymentError>;

    /// Entries that could not be matched to a transaction, or could not be parsed.
    async fn fetch_unresolved_callbacks(&self) -> Result<Vec<CallbackEntry>, PaymentError>;
}
