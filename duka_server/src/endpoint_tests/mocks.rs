use duka_common::Money;
use duka_engine::{
    traits::{PaymentInitiated, PaymentRequest, ProviderStatus},
    PaymentProvider,
    ProviderError,
};
use mockall::mock;

mock! {
    pub Provider {}
    impl PaymentProvider for Provider {
        async fn initiate_payment(&self, request: &PaymentRequest) -> Result<PaymentInitiated, ProviderError>;
        async fn query_payment_status(&self, correlation_id: &str) -> Result<ProviderStatus, ProviderError>;
        async fn reverse_payment(&self, receipt: &str, amount: Money, reason: &str) -> Result<String, ProviderError>;
    }
}

/// A provider that accepts exactly one STK push and hands back `correlation_id` for it.
pub fn accepting_provider(correlation_id: &'static str) -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_initiate_payment().times(1).returning(move |_| {
        Ok(PaymentInitiated {
            correlation_id: correlation_id.to_string(),
            merchant_request_id: Some(format!("mr-{correlation_id}")),
            message: "Success. Request accepted for processing".to_string(),
        })
    });
    provider
}

/// A provider that must not be called at all.
pub fn idle_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_initiate_payment().never();
    provider.expect_query_payment_status().never();
    provider.expect_reverse_payment().never();
    provider
}
