use crate::EngineError;
use deploy_core::Kind;
use serde::{Deserialize, Serialize};

/// One supply or demand report pushed by a producer or consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub producer: String,
    pub time: u64,
    pub value: f64,
    /// `supply:<commodity>` or `demand:<commodity>`.
    pub channel: String,
}

impl Observation {
    pub fn new(
        producer: impl Into<String>,
        time: u64,
        value: f64,
        kind: Kind,
        commodity: &str,
    ) -> Self {
        Self {
            producer: producer.into(),
            time,
            value,
            channel: format!("{kind}:{commodity}"),
        }
    }
}

/// Split a channel into its kind and commodity. The separator is optional so
/// `supplyfuel` and `supply:fuel` are equivalent.
pub fn parse_channel(channel: &str) -> Result<(Kind, &str), EngineError> {
    let (kind, rest) = if let Some(rest) = channel.strip_prefix(Kind::Supply.as_str()) {
        (Kind::Supply, rest)
    } else if let Some(rest) = channel.strip_prefix(Kind::Demand.as_str()) {
        (Kind::Demand, rest)
    } else {
        return Err(EngineError::Channel(channel.to_string()));
    };
    let commodity = rest.strip_prefix(':').unwrap_or(rest);
    if commodity.is_empty() {
        return Err(EngineError::Channel(channel.to_string()));
    }
    Ok((kind, commodity))
}
