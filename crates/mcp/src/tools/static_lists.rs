// Static list tools (lead database API)

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::leads::CsvList;
use crate::tools::{
    json_schema_array, json_schema_number, json_schema_object, json_schema_string, parse_args,
    relay, with_query, Tool,
};
use anyhow::Result;
use marketo_sdk::{ApiRequest, MarketoClient};
use serde::Deserialize;
use serde_json::json;

/// Tool to browse static lists
pub struct GetListsTool {
    client: MarketoClient,
}

impl GetListsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetListsArgs {
    #[serde(default)]
    name: Option<CsvList>,
    #[serde(default)]
    batch_size: Option<u32>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetListsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_lists".to_string(),
            description: "List static lists, optionally filtered by name".to_string(),
            input_schema: json_schema_object(
                json!({
                    "name": json_schema_array(json_schema_string("List name"), "List names to match"),
                    "batchSize": json_schema_number("Maximum number of lists per page (default: 300)"),
                    "nextPageToken": json_schema_string("Paging token from a previous call")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetListsArgs = parse_args("marketo_get_lists", arguments)?;

        let endpoint = with_query(
            "/v1/lists.json",
            &[
                ("name", args.name.map(|n| n.to_csv())),
                ("batchSize", args.batch_size.map(|b| b.to_string())),
                ("nextPageToken", args.next_page_token),
            ],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListIdArgs {
    list_id: u64,
}

/// Tool to get one static list
pub struct GetListByIdTool {
    client: MarketoClient,
}

impl GetListByIdTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for GetListByIdTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_list_by_id".to_string(),
            description: "Get a static list by its ID".to_string(),
            input_schema: json_schema_object(
                json!({
                    "listId": json_schema_number("ID of the static list")
                }),
                vec!["listId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: ListIdArgs = parse_args("marketo_get_list_by_id", arguments)?;
        let endpoint = format!("/v1/lists/{}.json", args.list_id);

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to page through the members of a static list
pub struct GetListLeadsTool {
    client: MarketoClient,
}

impl GetListLeadsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetListLeadsArgs {
    list_id: u64,
    #[serde(default)]
    fields: Option<CsvList>,
    #[serde(default)]
    batch_size: Option<u32>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetListLeadsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_list_leads".to_string(),
            description: "Get the leads that belong to a static list".to_string(),
            input_schema: json_schema_object(
                json!({
                    "listId": json_schema_number("ID of the static list"),
                    "fields": json_schema_array(json_schema_string("Field name"), "Lead fields to return"),
                    "batchSize": json_schema_number("Maximum number of leads per page (default: 300)"),
                    "nextPageToken": json_schema_string("Paging token from a previous call")
                }),
                vec!["listId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetListLeadsArgs = parse_args("marketo_get_list_leads", arguments)?;

        let endpoint = with_query(
            &format!("/v1/lists/{}/leads.json", args.list_id),
            &[
                ("fields", args.fields.map(|f| f.to_csv())),
                ("batchSize", args.batch_size.map(|b| b.to_string())),
                ("nextPageToken", args.next_page_token),
            ],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMembershipArgs {
    list_id: u64,
    lead_ids: Vec<u64>,
}

impl ListMembershipArgs {
    fn parse(tool: &str, arguments: serde_json::Value) -> Result<Self> {
        let args: Self = parse_args(tool, arguments)?;
        if args.lead_ids.is_empty() {
            anyhow::bail!("Invalid arguments for {}: leadIds must not be empty", tool);
        }
        Ok(args)
    }
}

fn membership_schema(name: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json_schema_object(
            json!({
                "listId": json_schema_number("ID of the static list"),
                "leadIds": json_schema_array(json_schema_number("Lead ID"), "IDs of the leads (up to 300)")
            }),
            vec!["listId", "leadIds"],
        ),
    }
}

/// Tool to add leads to a static list
pub struct AddLeadsToListTool {
    client: MarketoClient,
}

impl AddLeadsToListTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for AddLeadsToListTool {
    fn schema(&self) -> ToolSchema {
        membership_schema("marketo_add_leads_to_list", "Add leads to a static list")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args = ListMembershipArgs::parse("marketo_add_leads_to_list", arguments)?;

        let input: Vec<serde_json::Value> = args.lead_ids.iter().map(|id| json!({ "id": id })).collect();
        let request = ApiRequest::post(format!("/v1/lists/{}/leads.json", args.list_id))
            .json(json!({ "input": input }));

        Ok(relay(&self.client, request).await)
    }
}

/// Tool to remove leads from a static list
pub struct RemoveLeadsFromListTool {
    client: MarketoClient,
}

impl RemoveLeadsFromListTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for RemoveLeadsFromListTool {
    fn schema(&self) -> ToolSchema {
        membership_schema("marketo_remove_leads_from_list", "Remove leads from a static list")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args = ListMembershipArgs::parse("marketo_remove_leads_from_list", arguments)?;

        // DELETE is tunnelled through POST with `_method`, parameters form-encoded.
        let ids = args
            .lead_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = ApiRequest::post(format!(
            "/v1/lists/{}/leads.json?_method=DELETE",
            args.list_id
        ))
        .form(json!({ "id": ids }));

        Ok(relay(&self.client, request).await)
    }
}
