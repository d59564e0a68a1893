/// Metric names a transaction reports under.
#[derive(Copy, Clone, Debug)]
pub struct TransactionLabels {
    pub success: &'static str,
    pub error: &'static str,
    pub latency: &'static str,
}

#[macro_export]
macro_rules! generate_labels {
    ($base_name:ident) => {
        ::stampede::core::TransactionLabels {
            success: concat!("stampede_", stringify!($base_name), "_success"),
            error: concat!("stampede_", stringify!($base_name), "_error"),
            latency: concat!("stampede_", stringify!($base_name), "_latency"),
        }
    };
}
