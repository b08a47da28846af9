// Lead tools (lead database API)

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_array, json_schema_enum, json_schema_number, json_schema_object,
    json_schema_string, parse_args, relay, with_query, Tool,
};
use anyhow::Result;
use marketo_sdk::{ApiRequest, MarketoClient};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Accepts either `["a", "b"]` or `"a,b"` and renders the comma-separated
/// form the lead API expects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CsvList {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl CsvList {
    pub(crate) fn to_csv(&self) -> String {
        let render = |value: &serde_json::Value| match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };

        match self {
            Self::Many(values) => values.iter().map(render).collect::<Vec<_>>().join(","),
            Self::One(value) => render(value),
        }
    }
}

/// Tool to query leads by a filter field
pub struct GetLeadsTool {
    client: MarketoClient,
}

impl GetLeadsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLeadsArgs {
    filter_type: String,
    filter_values: CsvList,
    #[serde(default)]
    fields: Option<CsvList>,
    #[serde(default)]
    batch_size: Option<u32>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetLeadsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_leads".to_string(),
            description: "Get leads matching a filter field (e.g. email) and a set of values".to_string(),
            input_schema: json_schema_object(
                json!({
                    "filterType": json_schema_string("Lead field to filter on, e.g. email or id"),
                    "filterValues": json_schema_array(json_schema_string("Value"), "Values to match (up to 300)"),
                    "fields": json_schema_array(json_schema_string("Field name"), "Lead fields to return"),
                    "batchSize": json_schema_number("Maximum number of leads per page (default: 300)"),
                    "nextPageToken": json_schema_string("Paging token from a previous call")
                }),
                vec!["filterType", "filterValues"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetLeadsArgs = parse_args("marketo_get_leads", arguments)?;

        let filter_values = args.filter_values.to_csv();
        if args.filter_type.trim().is_empty() || filter_values.is_empty() {
            anyhow::bail!("Invalid arguments for marketo_get_leads: filterType and filterValues must not be empty");
        }

        let endpoint = with_query(
            "/v1/leads.json",
            &[
                ("filterType", Some(args.filter_type.trim().to_string())),
                ("filterValues", Some(filter_values)),
                ("fields", args.fields.map(|f| f.to_csv())),
                ("batchSize", args.batch_size.map(|b| b.to_string())),
                ("nextPageToken", args.next_page_token),
            ],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to get one lead
pub struct GetLeadByIdTool {
    client: MarketoClient,
}

impl GetLeadByIdTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLeadByIdArgs {
    lead_id: u64,
    #[serde(default)]
    fields: Option<CsvList>,
}

#[async_trait::async_trait]
impl Tool for GetLeadByIdTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_lead_by_id".to_string(),
            description: "Get a Marketo lead by its ID".to_string(),
            input_schema: json_schema_object(
                json!({
                    "leadId": json_schema_number("ID of the lead"),
                    "fields": json_schema_array(json_schema_string("Field name"), "Lead fields to return")
                }),
                vec!["leadId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetLeadByIdArgs = parse_args("marketo_get_lead_by_id", arguments)?;

        let endpoint = with_query(
            &format!("/v1/lead/{}.json", args.lead_id),
            &[("fields", args.fields.map(|f| f.to_csv()))],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to describe the lead schema
pub struct DescribeLeadsTool {
    client: MarketoClient,
}

impl DescribeLeadsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for DescribeLeadsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_describe_leads".to_string(),
            description: "Describe the lead fields available in this Marketo instance".to_string(),
            input_schema: json_schema_object(json!({}), vec![]),
        }
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<CallToolResult> {
        Ok(relay(&self.client, ApiRequest::get("/v1/leads/describe.json")).await)
    }
}

/// Tool to create or update leads in bulk
pub struct SyncLeadsTool {
    client: MarketoClient,
}

impl SyncLeadsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
enum SyncAction {
    CreateOnly,
    UpdateOnly,
    CreateOrUpdate,
    CreateDuplicate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncLeadsArgs {
    #[serde(default)]
    action: Option<SyncAction>,
    #[serde(default)]
    lookup_field: Option<String>,
    leads: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncLeadsBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lookup_field: Option<String>,
    input: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[async_trait::async_trait]
impl Tool for SyncLeadsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_sync_leads".to_string(),
            description: "Create or update leads (up to 300 per call)".to_string(),
            input_schema: json_schema_object(
                json!({
                    "action": json_schema_enum(
                        &["createOnly", "updateOnly", "createOrUpdate", "createDuplicate"],
                        "Sync mode (default: createOrUpdate)"
                    ),
                    "lookupField": json_schema_string("Field used to deduplicate (default: email)"),
                    "leads": json_schema_array(
                        json!({"type": "object"}),
                        "Lead records keyed by field API name"
                    )
                }),
                vec!["leads"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: SyncLeadsArgs = parse_args("marketo_sync_leads", arguments)?;
        if args.leads.is_empty() {
            anyhow::bail!("Invalid arguments for marketo_sync_leads: leads must not be empty");
        }

        let body = SyncLeadsBody {
            action: args.action,
            lookup_field: args.lookup_field.filter(|f| !f.trim().is_empty()),
            input: args.leads,
        };
        let request = ApiRequest::post("/v1/leads.json").json(serde_json::to_value(&body)?);

        Ok(relay(&self.client, request).await)
    }
}
