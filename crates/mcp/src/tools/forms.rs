// Form tools (asset API)

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_enum, json_schema_number, json_schema_object, json_schema_string, parse_args,
    relay, with_query, Tool, DEFAULT_MAX_RETURN,
};
use anyhow::Result;
use marketo_sdk::{ApiRequest, MarketoClient};
use serde::Deserialize;
use serde_json::json;

/// Tool to browse forms
pub struct GetFormsTool {
    client: MarketoClient,
}

impl GetFormsTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FormStatus {
    Approved,
    Draft,
}

impl FormStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Draft => "draft",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetFormsArgs {
    #[serde(default)]
    max_return: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
    #[serde(default)]
    status: Option<FormStatus>,
}

#[async_trait::async_trait]
impl Tool for GetFormsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_forms".to_string(),
            description: "List Marketo forms, optionally filtered by approval status".to_string(),
            input_schema: json_schema_object(
                json!({
                    "maxReturn": json_schema_number("Maximum number of forms to return (default: 200)"),
                    "offset": json_schema_number("Integer offset for paging (default: 0)"),
                    "status": json_schema_enum(&["approved", "draft"], "Status filter")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: GetFormsArgs = parse_args("marketo_get_forms", arguments)?;

        let endpoint = with_query(
            "/asset/v1/forms.json",
            &[
                ("maxReturn", Some(args.max_return.unwrap_or(DEFAULT_MAX_RETURN).to_string())),
                ("offset", Some(args.offset.unwrap_or(0).to_string())),
                ("status", args.status.map(|s| s.as_str().to_string())),
            ],
        );

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to get one form
pub struct GetFormByIdTool {
    client: MarketoClient,
}

impl GetFormByIdTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormIdArgs {
    form_id: u64,
}

#[async_trait::async_trait]
impl Tool for GetFormByIdTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_get_form_by_id".to_string(),
            description: "Get a Marketo form by its ID".to_string(),
            input_schema: json_schema_object(
                json!({
                    "formId": json_schema_number("ID of the form")
                }),
                vec!["formId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: FormIdArgs = parse_args("marketo_get_form_by_id", arguments)?;
        let endpoint = format!("/asset/v1/form/{}.json", args.form_id);

        Ok(relay(&self.client, ApiRequest::get(endpoint)).await)
    }
}

/// Tool to approve a draft form
pub struct ApproveFormTool {
    client: MarketoClient,
}

impl ApproveFormTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveFormArgs {
    form_id: u64,
    #[serde(default)]
    comment: Option<String>,
}

#[async_trait::async_trait]
impl Tool for ApproveFormTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_approve_form".to_string(),
            description: "Approve the current draft of a Marketo form".to_string(),
            input_schema: json_schema_object(
                json!({
                    "formId": json_schema_number("ID of the form"),
                    "comment": json_schema_string("Optional approval comment")
                }),
                vec!["formId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: ApproveFormArgs = parse_args("marketo_approve_form", arguments)?;

        let mut request = ApiRequest::post(format!("/asset/v1/form/{}/approve.json", args.form_id));
        if let Some(comment) = args.comment.filter(|c| !c.is_empty()) {
            request = request.json(json!({ "comment": comment }));
        }

        Ok(relay(&self.client, request).await)
    }
}

/// Tool to clone a form into a folder
pub struct CloneFormTool {
    client: MarketoClient,
}

impl CloneFormTool {
    pub fn new(client: MarketoClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloneFormArgs {
    form_id: u64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    folder_id: u64,
}

#[async_trait::async_trait]
impl Tool for CloneFormTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "marketo_clone_form".to_string(),
            description: "Clone a Marketo form into a folder".to_string(),
            input_schema: json_schema_object(
                json!({
                    "formId": json_schema_number("ID of the form to clone"),
                    "name": json_schema_string("Name of the new form"),
                    "description": json_schema_string("Description of the new form"),
                    "folderId": json_schema_number("ID of the destination folder")
                }),
                vec!["formId", "name", "folderId"],
            ),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: CloneFormArgs = parse_args("marketo_clone_form", arguments)?;

        // The asset API wants `folder` as a JSON document inside the form body.
        let folder = json!({ "id": args.folder_id, "type": "Folder" }).to_string();
        let body = json!({
            "name": args.name,
            "description": args.description,
            "folder": folder,
        });

        let request =
            ApiRequest::post(format!("/asset/v1/form/{}/clone.json", args.form_id)).form(body);

        Ok(relay(&self.client, request).await)
    }
}
