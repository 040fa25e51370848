use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::decoder;
use crate::error::{DecodeError, LedgerError, RejectCode};
use crate::traits::{LedgerGateway, RoundSlot};
use crate::types::{ConfigSnapshot, Instruction, ParticipantSnapshot, RoundId};

/// JSON-RPC client for the ledger relay.
///
/// # Protocol
/// - `getConfigAccount` -> `{"data": "<base64>"}`
/// - `getRoundAccounts {ids}` -> `[{"data": "<base64>"} | null, ...]` (index-aligned)
/// - `getParticipantAccounts {roundId, limit}` -> `[{"data": "<base64>"}, ...]`
/// - `submitInstructions {instructions}` -> `{"signature": "..."}`
///
/// Program rejections come back as JSON-RPC errors whose `data.programCode` holds the
/// program's custom error code.
pub struct RpcLedger {
    url: String,
    operator_token: String,
    client: Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorData {
    program_code: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    signature: String,
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

impl RpcLedger {
    pub fn new(url: String, operator_token: String, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            operator_token,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P: Serialize + Send + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<T, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!(method, "ledger rpc call");
        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .bearer_auth(&self.operator_token)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(match err.data.and_then(|d| d.program_code) {
                Some(code) => LedgerError::Rejected {
                    code: RejectCode::from_code(code),
                    message: err.message,
                },
                None => LedgerError::Rpc {
                    code: err.code,
                    message: err.message,
                },
            });
        }

        response
            .result
            .ok_or_else(|| LedgerError::Transport(format!("{}: empty rpc result", method)))
    }

    fn decode_account<T>(
        account: &AccountData,
        decode: impl Fn(&[u8]) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&account.data)
            .map_err(|e| DecodeError::Layout(format!("base64: {}", e)))?;
        decode(&bytes)
    }
}

#[async_trait]
impl LedgerGateway for RpcLedger {
    fn name(&self) -> &'static str {
        "rpc-ledger"
    }

    async fn get_config(&self) -> Result<ConfigSnapshot, LedgerError> {
        let account: AccountData = self.call("getConfigAccount", json!({})).await?;
        Self::decode_account(&account, decoder::decode_config)
            .map_err(|e| LedgerError::Transport(format!("config account: {}", e)))
    }

    async fn read_rounds(&self, ids: &[RoundId]) -> Result<Vec<RoundSlot>, LedgerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let accounts: Vec<Option<AccountData>> =
            self.call("getRoundAccounts", json!({ "ids": ids })).await?;
        if accounts.len() != ids.len() {
            return Err(LedgerError::Transport(format!(
                "getRoundAccounts returned {} accounts for {} ids",
                accounts.len(),
                ids.len()
            )));
        }

        Ok(ids
            .iter()
            .zip(accounts)
            .map(|(id, account)| {
                let account = account?;
                Some(
                    Self::decode_account(&account, decoder::decode_round).and_then(|round| {
                        if round.id == *id {
                            Ok(round)
                        } else {
                            Err(DecodeError::IdMismatch {
                                expected: *id,
                                found: round.id,
                            })
                        }
                    }),
                )
            })
            .collect())
    }

    async fn list_participants(
        &self,
        round_id: RoundId,
        limit: usize,
    ) -> Result<Vec<ParticipantSnapshot>, LedgerError> {
        let accounts: Vec<AccountData> = self
            .call(
                "getParticipantAccounts",
                json!({ "roundId": round_id, "limit": limit }),
            )
            .await?;

        Ok(accounts
            .iter()
            .filter_map(
                |account| match Self::decode_account(account, decoder::decode_participant) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(round_id, "Skipping undecodable participant account: {}", e);
                        None
                    }
                },
            )
            .take(limit)
            .collect())
    }

    async fn submit(&self, instructions: &[Instruction]) -> Result<String, LedgerError> {
        let result: SubmitResult = self
            .call(
                "submitInstructions",
                json!({ "instructions": instructions }),
            )
            .await?;
        Ok(result.signature)
    }
}
