//! Fee settings administration and the UI-facing fee quote.

use cardwallet_types::domain::{compute_fees, minimum_amount};
use cardwallet_types::{
    AppError, CardProviderClient, FeeQuoteQuery, FeeQuoteResponse, FeeSetting, LedgerRepository,
    UpsertFeeSettingRequest,
};
use tracing::info;

use super::{CardWalletService, parse_currency};

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    pub async fn list_fee_settings(&self) -> Result<Vec<FeeSetting>, AppError> {
        self.repo.list_fee_settings().await.map_err(Into::into)
    }

    /// Creates or replaces one fee parameter.
    #[tracing::instrument(skip(self), fields(key = %req.key, value = %req.value))]
    pub async fn upsert_fee_setting(
        &self,
        req: UpsertFeeSettingRequest,
    ) -> Result<FeeSetting, AppError> {
        let currency = req.currency.as_deref().map(parse_currency).transpose()?;
        let setting = FeeSetting::new(req.key.trim().to_ascii_lowercase(), req.value, currency)?;

        let saved = self.repo.upsert_fee_setting(setting).await?;
        info!(key = %saved.key, "fee setting updated");
        Ok(saved)
    }

    /// Quotes the fee split for an amount along with the minimum that applies.
    ///
    /// The quote does not enforce the minimum, so a UI can show both figures before the
    /// user submits. The workflows enforce it.
    pub async fn quote_fees(&self, query: FeeQuoteQuery) -> Result<FeeQuoteResponse, AppError> {
        let currency = parse_currency(&query.currency)?;
        let schedule = self.fee_schedule().await?;

        let breakdown = compute_fees(query.operation, query.amount, currency, &schedule)?;
        Ok(FeeQuoteResponse {
            breakdown,
            minimum_amount: minimum_amount(query.operation, currency, &schedule),
        })
    }
}
