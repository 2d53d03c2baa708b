use models::deployment::{Deployment, DeploymentLogEntry};
use models::device::{Identity, Inventory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRequest {
    /// Identity attributes encoded as a JSON string.
    pub id_data: String,
    pub pubkey: String,
    pub tenant_token: String,
}

impl AuthRequest {
    pub fn new(
        identity: &Identity,
        public_key: &str,
        tenant_token: &str,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            id_data: serde_json::to_string(identity)?,
            pubkey: public_key.to_string(),
            tenant_token: tenant_token.to_string(),
        })
    }

    /// Exact bytes that are signed and sent.
    pub fn body(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct InventoryAttribute {
    pub name: String,
    pub value: Value,
}

/// Lists go out unchanged, booleans as "true"/"false" and every other value
/// as its string form.
pub fn inventory_attributes(inventory: &Inventory) -> Vec<InventoryAttribute> {
    inventory
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::Array(_) => value.clone(),
                Value::String(text) => Value::String(text.clone()),
                Value::Bool(flag) => Value::String(flag.to_string()),
                Value::Null => Value::String(String::new()),
                other => Value::String(other.to_string()),
            };
            InventoryAttribute {
                name: name.clone(),
                value,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct NextDeploymentResponse {
    pub id: String,
    pub artifact: ArtifactInfo,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactInfo {
    pub artifact_name: String,
    #[serde(default)]
    pub source: ArtifactSource,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtifactSource {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub size: u64,
}

impl From<NextDeploymentResponse> for Deployment {
    fn from(response: NextDeploymentResponse) -> Self {
        Deployment {
            id: response.id,
            artifact_name: response.artifact.artifact_name,
            artifact_uri: response.artifact.source.uri,
            artifact_size: response.artifact.source.size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substate: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct LogUpload<'a> {
    pub messages: &'a [DeploymentLogEntry],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_body_embeds_identity_as_string() {
        let identity = Identity::from([("mac".to_string(), "02:00:00:00:00:01".to_string())]);
        let request = AuthRequest::new(&identity, "PEM", "tenant").unwrap();

        let body: Value = serde_json::from_str(&request.body().unwrap()).unwrap();
        assert_eq!(body["id_data"], r#"{"mac":"02:00:00:00:00:01"}"#);
        assert_eq!(body["pubkey"], "PEM");
        assert_eq!(body["tenant_token"], "tenant");
    }

    #[test]
    fn test_inventory_attribute_values() {
        let mut inventory = Inventory::new();
        inventory.insert("protocols".into(), json!(["modbus", "opcua"]));
        inventory.insert("plc_connected".into(), json!(true));
        inventory.insert("floor".into(), json!(12));
        inventory.insert("device_type".into(), json!("pos-terminal"));

        let attributes = inventory_attributes(&inventory);
        let value = |name: &str| {
            attributes
                .iter()
                .find(|attribute| attribute.name == name)
                .map(|attribute| attribute.value.clone())
                .unwrap()
        };

        assert_eq!(value("protocols"), json!(["modbus", "opcua"]));
        assert_eq!(value("plc_connected"), json!("true"));
        assert_eq!(value("floor"), json!("12"));
        assert_eq!(value("device_type"), json!("pos-terminal"));
    }

    #[test]
    fn test_next_deployment_without_size() {
        let response: NextDeploymentResponse = serde_json::from_value(json!({
            "id": "w81s4fae-7dec-11d0-a765-00a0c91e6bf6",
            "artifact": {
                "artifact_name": "tcu-4g-lte-v1.1.0",
                "source": { "uri": "https://s3.local/artifact", "expire": "2026-01-01T00:00:00Z" },
                "device_types_compatible": ["tcu-4g-lte"]
            }
        }))
        .unwrap();

        let deployment = Deployment::from(response);
        assert_eq!(deployment.artifact_name, "tcu-4g-lte-v1.1.0");
        assert_eq!(deployment.artifact_uri, "https://s3.local/artifact");
        assert_eq!(deployment.artifact_size, 0);
    }

    #[test]
    fn test_status_report_omits_missing_substate() {
        let report = StatusReport {
            status: "installing",
            substate: None,
        };
        assert_eq!(serde_json::to_value(&report).unwrap(), json!({"status": "installing"}));
    }
}
