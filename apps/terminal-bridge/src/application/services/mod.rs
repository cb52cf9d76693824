//! Application Services
//!
//! `TerminalGateway` turns feature requests ("positions for account 7")
//! into a typed payload, sends it through a [`TerminalPort`] and runs the
//! response through the matching entity pipeline.

use std::sync::Arc;

use serde_json::Value;

use crate::application::ports::{CorrelationError, TerminalPort};
use crate::domain::catalog::{self, AccountRecords, AssetSelection};
use crate::domain::entry::{EntryError, Source};
use crate::domain::payloads::{
    ArchiveQuery, DataQuery, DataQueryKind, OrderCancel, OrderEnter, OrderLimit, TerminalPayload,
};

// =============================================================================
// Errors
// =============================================================================

/// Failure of one feature request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The terminal did not answer.
    #[error(transparent)]
    Terminal(#[from] CorrelationError),

    /// The answer could not be shaped.
    #[error(transparent)]
    Entry(#[from] EntryError),

    /// The typed payload could not be turned into JSON.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether the request succeeded but matched no data.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Entry(e) if e.is_missing())
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// One async method per feature request.
pub struct TerminalGateway<T: TerminalPort> {
    terminal: Arc<T>,
}

impl<T: TerminalPort> Clone for TerminalGateway<T> {
    fn clone(&self) -> Self {
        Self {
            terminal: Arc::clone(&self.terminal),
        }
    }
}

impl<T: TerminalPort> TerminalGateway<T> {
    /// Create a gateway over a terminal port.
    pub const fn new(terminal: Arc<T>) -> Self {
        Self { terminal }
    }

    async fn fetch<P, S>(&self, payload: &P, source: &S) -> Result<Value, GatewayError>
    where
        P: TerminalPayload + Sync,
        S: Source,
    {
        let body = serde_json::to_value(payload)?;
        let raw = self.terminal.request(P::CHANNEL, body).await?;
        let shaped = source.run(&raw).inspect_err(|e| {
            if e.is_missing() {
                tracing::debug!(channel = %P::CHANNEL, reason = %e, "No matching data");
            } else {
                tracing::warn!(channel = %P::CHANNEL, error = %e, "Response could not be shaped");
            }
        })?;
        Ok(shaped)
    }

    /// Every trading account.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn accounts(&self) -> Result<Value, GatewayError> {
        self.fetch(&DataQuery::all(DataQueryKind::Accounts), &catalog::accounts())
            .await
    }

    async fn account_records(
        &self,
        kind: DataQueryKind,
        records: AccountRecords,
        account_id: i64,
    ) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::for_account(kind, account_id),
            &catalog::account_records(records, account_id),
        )
        .await
    }

    /// Money balances of one account.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn balances(&self, account_id: i64) -> Result<Value, GatewayError> {
        self.account_records(DataQueryKind::Balances, catalog::BALANCES, account_id)
            .await
    }

    /// Open positions of one account.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn positions(&self, account_id: i64) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::for_account(DataQueryKind::Positions, account_id),
            &catalog::positions(account_id),
        )
        .await
    }

    /// Orders of one account.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn orders(&self, account_id: i64) -> Result<Value, GatewayError> {
        self.account_records(DataQueryKind::Orders, catalog::ORDERS, account_id)
            .await
    }

    /// Trading limits of one account.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn limits(&self, account_id: i64) -> Result<Value, GatewayError> {
        self.account_records(DataQueryKind::Limits, catalog::LIMITS, account_id)
            .await
    }

    /// Subaccounts of one account.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn subaccounts(&self, account_id: i64) -> Result<Value, GatewayError> {
        self.account_records(DataQueryKind::Razdels, catalog::SUBACCOUNTS, account_id)
            .await
    }

    /// Assets with their instruments.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn assets(&self, selection: AssetSelection) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::all(DataQueryKind::Assets),
            &catalog::assets(selection),
        )
        .await
    }

    /// Allowed order parameters for an optional object group and board.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn allowed_order_params(
        &self,
        object_group: Option<i64>,
        market_board: Option<i64>,
    ) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::all(DataQueryKind::AllowedOrderParams),
            &catalog::allowed_order_params(object_group, market_board),
        )
        .await
    }

    /// Market boards.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn market_boards(&self) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::all(DataQueryKind::MarketBoards),
            &catalog::market_boards(),
        )
        .await
    }

    /// Object groups.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn object_groups(&self) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::all(DataQueryKind::ObjectGroups),
            &catalog::object_groups(),
        )
        .await
    }

    /// Object types.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn object_types(&self) -> Result<Value, GatewayError> {
        self.fetch(
            &DataQuery::all(DataQueryKind::ObjectTypes),
            &catalog::object_types(),
        )
        .await
    }

    /// Archived candles.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn candles(&self, query: ArchiveQuery) -> Result<Value, GatewayError> {
        self.fetch(&query, &catalog::candles(query.kind())).await
    }

    /// Enter an order.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure. A
    /// rejection by the terminal is not an error; it is reported in the
    /// acknowledgement's `Error` object.
    pub async fn enter_order(&self, order: OrderEnter) -> Result<Value, GatewayError> {
        tracing::info!(order = ?order, "Entering order");
        self.fetch(&order, &catalog::order_entered()).await
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn cancel_order(&self, cancel: OrderCancel) -> Result<Value, GatewayError> {
        tracing::info!(
            account_id = cancel.id_account,
            num_order = cancel.num_order,
            "Cancelling order"
        );
        self.fetch(&cancel, &catalog::order_cancelled()).await
    }

    /// Maximum size of a prospective order.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] on terminal or shaping failure.
    pub async fn order_limit(&self, query: OrderLimit) -> Result<Value, GatewayError> {
        self.fetch(&query, &catalog::order_limit()).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mockall::predicate::{always, eq};
    use serde_json::json;

    use super::*;
    use crate::application::ports::MockTerminalPort;
    use crate::domain::envelope::Channel;
    use crate::domain::payloads::{CandleKind, Interval, Side};

    fn gateway(mock: MockTerminalPort) -> TerminalGateway<MockTerminalPort> {
        TerminalGateway::new(Arc::new(mock))
    }

    fn answering(channel: Channel, body: Value, payload: &'static str) -> MockTerminalPort {
        let mut mock = MockTerminalPort::new();
        mock.expect_request()
            .with(eq(channel), eq(body))
            .times(1)
            .returning(move |_, _| Ok(payload.to_string()));
        mock
    }

    #[tokio::test]
    async fn accounts_end_to_end() {
        let mock = answering(
            Channel::DataQuery,
            json!({"Type": "Accounts"}),
            r#"{"Data":[{"IdAccount":7,"IIAType":1}]}"#,
        );
        let out = gateway(mock).accounts().await.unwrap();
        assert_eq!(out, json!([{"AccountId": 7, "IIAType": 1}]));
    }

    #[tokio::test]
    async fn balances_scoped_to_account() {
        let mock = answering(
            Channel::DataQuery,
            json!({"Type": "Balances", "IdAccount": 7}),
            r#"{"Data":[{"IdAccount":8,"IdRazdel":1,"Currency":"RUB","Balance":1.0,"Blocked":0.0,"Available":1.0}]}"#,
        );
        let err = gateway(mock).balances(7).await.unwrap_err();
        assert!(err.is_missing());
        assert_eq!(err.to_string(), "Account balances are missing");
    }

    #[tokio::test]
    async fn terminal_failure_propagates() {
        let mut mock = MockTerminalPort::new();
        mock.expect_request()
            .with(always(), always())
            .returning(|_, _| Err(CorrelationError::NotReceived));
        let err = gateway(mock).market_boards().await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Terminal(CorrelationError::NotReceived)
        ));
        assert!(!err.is_missing());
    }

    #[tokio::test]
    async fn candles_use_archive_channel() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let query = ArchiveQuery::new(100, CandleKind::Ohlcv, Interval::Day, 1, day, day).unwrap();
        let mock = answering(
            Channel::ArchiveQuery,
            json!({
                "IdFi": 100, "CandleType": 0, "Interval": "day", "Period": 1,
                "FirstDay": "2024-06-01", "LastDay": "2024-06-01"
            }),
            r#"{"OHLCV":[{"Open":1.1,"Close":1.2,"Low":1.0,"High":1.3,"Volume":10,"VolumeAsk":5,"OpenInt":0,"DT":"2024-06-01"}]}"#,
        );
        let out = gateway(mock).candles(query).await.unwrap();
        assert_eq!(out["candles"][0]["Volume"]["value"], json!(10));
    }

    #[tokio::test]
    async fn enter_order_reports_rejection_in_ack() {
        let order = OrderEnter::new(7, 1, 100, Side::Sell, 5, 0.0, "").unwrap();
        let mock = answering(
            Channel::OrderEnter,
            json!({
                "IdAccount": 7, "IdRazdel": 1, "IdFi": 100, "BuySell": -1,
                "Quantity": 5, "Price": 0.0, "Comment": ""
            }),
            r#"{"Data":{"NumOrder":0,"IdAccount":7,"IdFi":100,"Error":{"Code":4,"Message":"Insufficient funds"}}}"#,
        );
        let out = gateway(mock).enter_order(order).await.unwrap();
        assert_eq!(out["order"]["Error"]["Code"], json!(4));
    }

    #[tokio::test]
    async fn malformed_payload_is_entry_error() {
        let mock = answering(
            Channel::OrderCancel,
            json!({"IdAccount": 7, "NumOrder": 5}),
            "not json",
        );
        let err = gateway(mock)
            .cancel_order(OrderCancel {
                id_account: 7,
                num_order: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Entry(EntryError::Json(_))));
    }
}
