//! Line-delimited JSON-RPC server over stdio.
//!
//! One server process speaks for one authenticated agent. Whatever launched
//! it vouches for that identity; every call runs as that agent.

use std::sync::Arc;
use std::time::Duration;

use engine::{PolicyWrite, Service};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use stewardship::{AppealFiling, NewActivity, NewIntervention};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::protocol::{
    INTERNAL_ERROR, INVALID_REQUEST, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::wire::*;

type Reply = std::result::Result<Value, JsonRpcError>;

pub struct Server {
    service: Mutex<Service>,
    agent: String,
}

fn params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, JsonRpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn reply<T: Serialize>(value: T) -> Reply {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

fn encode(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{INTERNAL_ERROR},"message":"{e}"}}}}"#)
    })
}

impl Server {
    pub fn new(service: Service, agent: impl Into<String>) -> Self {
        Self {
            service: Mutex::new(service),
            agent: agent.into(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Handle one request line. Notifications produce no output.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                let error = JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}"));
                return Some(encode(&JsonRpcResponse::failure(None, error)));
            }
        };

        if request.jsonrpc != "2.0" {
            let error = JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\"");
            return Some(encode(&JsonRpcResponse::failure(request.id, error)));
        }

        let result = self.dispatch(&request.method, request.params).await;
        if let Err(e) = &result {
            tracing::debug!(method = %request.method, code = e.code, error = %e.message, "request failed");
        }

        let id = request.id?;
        let response = match result {
            Ok(value) => JsonRpcResponse::success(Some(id), value),
            Err(error) => JsonRpcResponse::failure(Some(id), error),
        };
        Some(encode(&response))
    }

    async fn dispatch(&self, method: &str, p: Value) -> Reply {
        let service = self.service.lock().await;
        let me = self.agent.as_str();

        match method {
            // policy chain
            "get_my_computed_policy" => {
                let input: DeviceInput = params(p)?;
                let policy = service.get_my_computed_policy(me, input.device_id.as_deref())?;
                reply(ComputedPolicyOutput::new(&policy)?)
            }
            "get_policy_chain" => {
                let input: SubjectInput = params(p)?;
                reply(service.get_policy_chain(me, &input.subject_id)?)
            }
            "get_policy_layers" => {
                let input: SubjectInput = params(p)?;
                let layers = service.get_policy_layers(me, &input.subject_id, input.device_id.as_deref())?;
                let layers = layers
                    .iter()
                    .map(DevicePolicyOutput::new)
                    .collect::<Result<Vec<_>>>()?;
                reply(layers)
            }
            "get_parent_policy" => {
                let input: SubjectInput = params(p)?;
                match service.get_parent_policy(me, &input.subject_id)? {
                    Some(policy) => reply(ComputedPolicyOutput::new(&policy)?),
                    None => Ok(Value::Null),
                }
            }
            "upsert_policy" => {
                let input: UpsertPolicyInput = params(p)?;
                let policy = service.upsert_policy(me, PolicyWrite::try_from(input)?)?;
                reply(DevicePolicyOutput::new(&policy)?)
            }

            // access decisions
            "check_content_access" => {
                let input: ContentCheckInput = params(p)?;
                reply(service.check_content_access(
                    me,
                    input.device_id.as_deref(),
                    &input.request,
                    input.fail_mode,
                )?)
            }
            "check_feature_access" => {
                let input: FeatureCheckInput = params(p)?;
                reply(service.check_feature_access(me, input.device_id.as_deref(), &input.feature)?)
            }
            "requires_approval" => {
                let input: FeatureCheckInput = params(p)?;
                reply(service.requires_approval(me, input.device_id.as_deref(), &input.feature)?)
            }
            "check_route_access" => {
                let input: RouteCheckInput = params(p)?;
                reply(service.check_route_access(me, input.device_id.as_deref(), &input.route)?)
            }
            "check_time_access" => {
                let input: TimeCheckInput = params(p)?;
                reply(service.check_time_access(me, input.device_id.as_deref(), input.local_time)?)
            }

            // grants
            "create_stewardship_grant" => {
                let input: CreateGrantInput = params(p)?;
                reply(service.create_stewardship_grant(me, input.into())?)
            }
            "delegate_grant" => {
                let input: DelegateGrantInput = params(p)?;
                reply(service.delegate_grant(me, input.into())?)
            }
            "revoke_grant" => {
                let input: GrantInput = params(p)?;
                reply(service.revoke_grant(me, &input.grant_id)?)
            }
            "review_grant" => {
                let input: GrantInput = params(p)?;
                reply(service.review_grant(me, &input.grant_id)?)
            }
            "get_my_subjects" => reply::<Vec<GrantOutput>>(service.get_my_subjects(me)?),
            "get_my_stewards" => reply::<Vec<GrantOutput>>(service.get_my_stewards(me)?),

            // appeals
            "file_appeal" => {
                let input: FileAppealInput = params(p)?;
                let appeal = service.file_appeal(me, AppealFiling::try_from(input)?)?;
                reply(AppealOutput::new(&appeal)?)
            }
            "get_my_appeals" => appeals(&service.get_my_appeals(me)?),
            "get_appeals_to_decide" => appeals(&service.get_appeals_to_decide(me)?),
            "claim_appeal" => {
                let input: AppealInput = params(p)?;
                reply(AppealOutput::new(&service.claim_appeal(me, &input.appeal_id)?)?)
            }
            "escalate_appeal" => {
                let input: AppealInput = params(p)?;
                reply(AppealOutput::new(&service.escalate_appeal(me, &input.appeal_id)?)?)
            }
            "decide_appeal" => {
                let input: DecideAppealInput = params(p)?;
                let appeal =
                    service.decide_appeal(me, &input.appeal_id, input.approved, &input.decision_notes)?;
                reply(AppealOutput::new(&appeal)?)
            }

            // interventions
            "initiate_intervention" => {
                let input: InitiateInterventionInput = params(p)?;
                let intervention = service.initiate_intervention(me, NewIntervention::try_from(input)?)?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "support_intervention" => {
                let input: SupportInterventionInput = params(p)?;
                let (intervention, _) = service.support_intervention(
                    me,
                    &input.intervention_id,
                    input.relationship_level,
                    input.reason,
                )?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "notify_subject" => {
                let input: InterventionInput = params(p)?;
                reply(InterventionOutput::new(&service.notify_subject(me, &input.intervention_id)?)?)
            }
            "open_response_window" => {
                let input: InterventionInput = params(p)?;
                let intervention = service.open_response_window(me, &input.intervention_id)?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "respond_to_intervention" => {
                let input: RespondInput = params(p)?;
                let intervention =
                    service.respond_to_intervention(me, &input.intervention_id, &input.response)?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "begin_arbitration" => {
                let input: InterventionInput = params(p)?;
                let intervention = service.begin_arbitration(me, &input.intervention_id)?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "resolve_intervention" => {
                let input: ResolveInput = params(p)?;
                let intervention = service.resolve_intervention(
                    me,
                    &input.intervention_id,
                    input.resolution,
                    &input.notes,
                )?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "review_intervention" => {
                let input: ReviewInput = params(p)?;
                let intervention =
                    service.review_intervention(me, &input.intervention_id, input.restore, &input.notes)?;
                reply(InterventionOutput::new(&intervention)?)
            }
            "get_my_interventions" => {
                let interventions = service
                    .get_my_interventions(me)?
                    .iter()
                    .map(InterventionOutput::new)
                    .collect::<Result<Vec<_>>>()?;
                reply(interventions)
            }

            // activity
            "log_activity" => {
                let input: LogActivityInput = params(p)?;
                let log = service.log_activity(me, NewActivity::try_from(input)?)?;
                reply(ActivityLogOutput::new(&log)?)
            }
            "get_my_activity_logs" => logs(&service.get_my_activity_logs(me)?),
            "get_subject_activity_logs" => {
                let input: SubjectInput = params(p)?;
                logs(&service.get_subject_activity_logs(me, &input.subject_id)?)
            }

            "sweep" => reply(service.sweep()?),

            _ => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("unknown method '{method}'"))),
        }
    }

    /// Serve requests from stdin until it closes. With `sweep_every`, the
    /// deadline sweep also runs on that interval.
    pub async fn serve_stdio(self: Arc<Self>, sweep_every: Option<Duration>) -> Result<()> {
        let sweeper = sweep_every.map(|every| {
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval(every);
                loop {
                    ticks.tick().await;
                    match server.service.lock().await.sweep() {
                        Ok(report) => tracing::debug!(?report, "sweep finished"),
                        Err(e) => tracing::warn!(error = %e, "sweep failed"),
                    }
                }
            })
        });

        tracing::info!(agent = %self.agent, "serving on stdio");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let outcome = async {
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(response) = self.handle_line(&line).await {
                    stdout.write_all(response.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
            Ok::<(), crate::Error>(())
        }
        .await;

        if let Some(task) = sweeper {
            task.abort();
        }
        tracing::info!("stdin closed");
        outcome
    }
}

fn appeals(list: &[stewardship::StewardshipAppeal]) -> Reply {
    let out = list.iter().map(AppealOutput::new).collect::<Result<Vec<_>>>()?;
    reply(out)
}

fn logs(list: &[stewardship::ActivityLog]) -> Reply {
    let out = list.iter().map(ActivityLogOutput::new).collect::<Result<Vec<_>>>()?;
    reply(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::Store;

    fn server(agent: &str) -> Server {
        Server::new(Service::new(Store::in_memory().unwrap()), agent)
    }

    async fn call(server: &Server, method: &str, params: Value) -> Value {
        let line = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}).to_string();
        let out = server.handle_line(&line).await.unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[tokio::test]
    async fn garbage_is_a_parse_error() {
        let out = server("kid").handle_line("{not json").await.unwrap();
        let resp: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert!(resp["id"].is_null());
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let line = r#"{"jsonrpc":"2.0","method":"get_my_stewards"}"#;
        assert!(server("kid").handle_line(line).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method() {
        let resp = call(&server("kid"), "drop_tables", json!({})).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_params_are_invalid_params() {
        let resp = call(&server("kid"), "revoke_grant", json!({"grant_id": 5})).await;
        assert_eq!(resp["error"]["code"], crate::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn empty_chain_is_unrestricted() {
        let resp = call(&server("kid"), "get_my_computed_policy", Value::Null).await;
        let policy = &resp["result"];
        assert_eq!(policy["subject_id"], "kid");
        assert_eq!(policy["blocked_categories_json"], "[]");
        assert_eq!(policy["subject_can_view"], true);
    }

    #[tokio::test]
    async fn self_layer_round_trips_through_the_wire() {
        let server = server("kid");
        let resp = call(
            &server,
            "upsert_policy",
            json!({"blocked_categories": ["gambling"], "disabled_features": ["chat"]}),
        )
        .await;
        assert_eq!(resp["result"]["version"], 1);
        assert_eq!(resp["result"]["author_tier"], "self");

        let resp = call(
            &server,
            "check_content_access",
            json!({"content_hash": "sha256:x", "categories": ["gambling"]}),
        )
        .await;
        assert_eq!(resp["result"]["decision"], "block");

        let resp = call(&server, "check_feature_access", json!({"feature": "chat"})).await;
        assert_eq!(resp["result"], false);
    }

    #[tokio::test]
    async fn grant_errors_carry_their_kind() {
        let resp = call(
            &server("parent"),
            "create_stewardship_grant",
            json!({
                "subject_id": "kid",
                "authority_basis": "minor_guardianship",
                "evidence_hash": "",
                "verified_by": "registry",
                "content_filtering": true,
                "expires_in_days": 365,
                "review_in_days": 90
            }),
        )
        .await;
        assert_eq!(resp["error"]["data"]["kind"], "evidence_invalid");
        assert_eq!(resp["error"]["data"]["retryable"], false);
    }

    #[tokio::test]
    async fn sweep_reports_counts() {
        let resp = call(&server("ops"), "sweep", json!({})).await;
        assert_eq!(resp["result"]["grants_expired"], 0);
    }
}
