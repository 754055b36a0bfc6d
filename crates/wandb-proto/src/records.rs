//! Record and result messages of the internal service.

/// One hyperparameter entry. `value_json` holds a JSON literal.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigItem {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value_json: String,
}

/// Batch of config updates sent with the initial run update.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigRecord {
    #[prost(message, repeated, tag = "1")]
    pub update: Vec<ConfigItem>,
}

/// One metric entry of a history row.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HistoryItem {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value_json: String,
}

/// One history row. The `_step` index is carried as a regular item.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HistoryRecord {
    #[prost(message, repeated, tag = "1")]
    pub item: Vec<HistoryItem>,
}

/// Run metadata. Sent by the client to open a run and returned by the backend
/// with the server-assigned identity filled in.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunRecord {
    #[prost(string, tag = "1")]
    pub run_id: String,
    #[prost(string, tag = "2")]
    pub entity: String,
    #[prost(string, tag = "3")]
    pub project: String,
    #[prost(message, optional, tag = "4")]
    pub config: Option<ConfigRecord>,
    #[prost(string, tag = "6")]
    pub sweep_id: String,
    #[prost(string, tag = "7")]
    pub host: String,
    #[prost(string, tag = "8")]
    pub display_name: String,
    #[prost(string, tag = "9")]
    pub notes: String,
    #[prost(string, repeated, tag = "10")]
    pub tags: Vec<String>,
    #[prost(string, tag = "11")]
    pub job_type: String,
    #[prost(string, tag = "12")]
    pub run_group: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorInfo {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunUpdateResult {
    #[prost(message, optional, tag = "1")]
    pub run: Option<RunRecord>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HistoryResult {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunExitRecord {
    #[prost(int32, tag = "1")]
    pub exit_code: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunExitResult {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerShutdownRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerShutdownResult {}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_run_record_survives_the_wire() {
        let record = RunRecord {
            run_id: "abc123".to_string(),
            entity: "team".to_string(),
            project: "demo".to_string(),
            config: Some(ConfigRecord {
                update: vec![ConfigItem {
                    key: "lr".to_string(),
                    value_json: "0.01".to_string(),
                }],
            }),
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };

        let bytes = record.encode_to_vec();
        let decoded = RunRecord::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_empty_acknowledgements_encode_to_nothing() {
        assert!(HistoryResult {}.encode_to_vec().is_empty());
        assert!(ServerShutdownRequest {}.encode_to_vec().is_empty());
    }
}
