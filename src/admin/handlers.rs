use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::dispatcher::{ApprovalId, ApprovalRequest, ChainSession, Decision};
use crate::http::server::AppState;
use crate::protocol::WalletError;
use crate::provider::{ChainId, ProviderError, ProviderStatus};
use crate::vault::{Account, AccountId, VaultError, VaultStatus};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("vault task failed: {0}")]
    Task(String),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Vault(e) => vault_status(e),
            Self::Provider(e) => provider_status(e),
            Self::Wallet(WalletError::Vault(e)) => vault_status(e),
            Self::Wallet(WalletError::Provider(e)) => provider_status(e),
            Self::Wallet(WalletError::Validation { .. }) => StatusCode::BAD_REQUEST,
            Self::Wallet(WalletError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            Self::Wallet(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Run vault work on the blocking pool. Unlock and derivation stretch keys
/// and sync the store to disk.
async fn blocking<T, E>(work: impl FnOnce() -> Result<T, E> + Send + 'static) -> Result<T, AdminError>
where
    T: Send + 'static,
    E: Into<AdminError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AdminError::Task(e.to_string()))?
        .map_err(Into::into)
}

fn vault_status(err: &VaultError) -> StatusCode {
    match err {
        VaultError::Locked => StatusCode::LOCKED,
        VaultError::Decryption => StatusCode::UNAUTHORIZED,
        VaultError::InvalidMnemonic => StatusCode::BAD_REQUEST,
        VaultError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        VaultError::NotInitialized
        | VaultError::AlreadyInitialized
        | VaultError::Derivation(_)
        | VaultError::Halted(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn provider_status(err: &ProviderError) -> StatusCode {
    match err {
        ProviderError::UnsupportedChain(_) | ProviderError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        ProviderError::NoHealthyProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
        ProviderError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Admin request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type AdminResult<T> = Result<Json<T>, AdminError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub vault: VaultStatus,
    pub pending_approvals: usize,
    pub sessions: usize,
    pub providers: usize,
}

/// Account as shown to operators. Key material never leaves the vault.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: AccountId,
    pub address: Address,
    pub label: String,
    pub derivation_path: String,
    pub primary: bool,
    pub parent: Option<AccountId>,
    pub include_in_balance: bool,
    pub retired: bool,
    pub selected: bool,
}

impl AccountView {
    fn new(account: &Account, selected: Option<Address>) -> Self {
        Self {
            id: account.id,
            address: account.address,
            label: account.label.clone(),
            derivation_path: account.derivation_path.clone(),
            primary: account.is_primary(),
            parent: account.parent(),
            include_in_balance: account.include_in_balance,
            retired: account.retired,
            selected: selected == Some(account.address),
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let ctx = &state.ctx;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: ctx.uptime_secs(),
        vault: ctx.vault().status(),
        pending_approvals: ctx.dispatcher().approvals().len(),
        sessions: ctx.dispatcher().sessions().list().len(),
        providers: ctx.pool().records().len(),
    })
}

// --- Providers ---

pub async fn get_providers(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    Json(state.ctx.pool().status())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchProviderRequest {
    pub chain_id: ChainId,
    /// Named target; the next healthy provider when absent.
    pub provider: Option<String>,
}

pub async fn switch_provider(
    State(state): State<AppState>,
    Json(body): Json<SwitchProviderRequest>,
) -> AdminResult<serde_json::Value> {
    let active = state.ctx.pool().switch_provider(body.chain_id, body.provider.as_deref())?;
    Ok(Json(json!({ "chainId": body.chain_id, "active": active })))
}

// --- Approvals ---

pub async fn get_approvals(State(state): State<AppState>) -> Json<Vec<ApprovalRequest>> {
    Json(state.ctx.dispatcher().approvals().list())
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

pub async fn decide_approval(
    State(state): State<AppState>,
    Path(id): Path<ApprovalId>,
    Json(body): Json<DecisionRequest>,
) -> AdminResult<serde_json::Value> {
    let dispatcher = state.ctx.dispatcher();
    if dispatcher.approvals().get(id).is_none() {
        return Err(AdminError::NotFound(format!("approval {}", id)));
    }
    dispatcher.decide(id, body.decision)?;
    tracing::info!(approval_id = id, decision = ?body.decision, "Approval decided");
    Ok(Json(json!({ "id": id, "decision": body.decision })))
}

// --- Accounts ---

pub async fn get_accounts(State(state): State<AppState>) -> Json<Vec<AccountView>> {
    let vault = state.ctx.vault();
    let selected = vault.selected().map(|a| a.address);
    Json(vault.accounts().iter().map(|a| AccountView::new(a, selected)).collect())
}

#[derive(Deserialize, Default)]
pub struct DeriveRequest {
    /// Primary to derive a sub account under; a new primary when absent.
    pub parent: Option<AccountId>,
}

pub async fn derive_account(
    State(state): State<AppState>,
    body: Option<Json<DeriveRequest>>,
) -> AdminResult<AccountView> {
    let parent = body.map(|Json(b)| b.parent).unwrap_or_default();
    let account = blocking(move || state.ctx.dispatcher().derive_account(parent)).await?;
    Ok(Json(AccountView::new(&account, Some(account.address))))
}

pub async fn select_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> AdminResult<AccountView> {
    let account = blocking(move || state.ctx.dispatcher().select_account(id)).await?;
    Ok(Json(AccountView::new(&account, Some(account.address))))
}

pub async fn retire_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> Result<StatusCode, AdminError> {
    blocking(move || state.ctx.dispatcher().retire_account(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct BalanceRequest {
    pub include: bool,
}

pub async fn set_include_in_balance(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
    Json(body): Json<BalanceRequest>,
) -> Result<StatusCode, AdminError> {
    blocking(move || state.ctx.vault().set_include_in_balance(id, body.include)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Vault ---

#[derive(Deserialize)]
pub struct CreateVaultRequest {
    pub passphrase: String,
    /// Phrase to import; a fresh one is generated when absent.
    pub mnemonic: Option<String>,
}

#[derive(Serialize)]
pub struct CreatedVault {
    pub account: AccountView,
    /// Shown once. Not retrievable afterwards.
    pub mnemonic: String,
}

pub async fn create_vault(
    State(state): State<AppState>,
    Json(body): Json<CreateVaultRequest>,
) -> AdminResult<CreatedVault> {
    let (account, phrase) =
        blocking(move || state.ctx.vault().create(&body.passphrase, body.mnemonic.as_deref())).await?;
    Ok(Json(CreatedVault {
        account: AccountView::new(&account, Some(account.address)),
        mnemonic: phrase.to_string(),
    }))
}

#[derive(Deserialize)]
pub struct UnlockRequest {
    pub passphrase: String,
}

pub async fn unlock_vault(
    State(state): State<AppState>,
    Json(body): Json<UnlockRequest>,
) -> Result<StatusCode, AdminError> {
    blocking(move || state.ctx.dispatcher().unlock_wallet(&body.passphrase)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn lock_vault(State(state): State<AppState>) -> StatusCode {
    state.ctx.dispatcher().lock_wallet();
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
pub struct ChangePassphraseRequest {
    pub current: String,
    pub new: String,
}

pub async fn change_passphrase(
    State(state): State<AppState>,
    Json(body): Json<ChangePassphraseRequest>,
) -> Result<StatusCode, AdminError> {
    blocking(move || state.ctx.vault().change_passphrase(&body.current, &body.new)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn acknowledge_fault(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.ctx.vault().acknowledge_fault();
    Json(json!({ "cleared": cleared }))
}

// --- Sessions ---

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<ChainSession>> {
    Json(state.ctx.dispatcher().sessions().list())
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    pub origin: String,
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Json(body): Json<RevokeRequest>,
) -> AdminResult<serde_json::Value> {
    let dispatcher = state.ctx.dispatcher();
    if !dispatcher.sessions().contains(&body.origin) {
        return Err(AdminError::NotFound(format!("session for {}", body.origin)));
    }
    let revoked = dispatcher.revoke_origin(&body.origin);
    Ok(Json(json!({ "origin": body.origin, "revoked": revoked })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_errors_map_to_statuses() {
        assert_eq!(AdminError::from(VaultError::Locked).status(), StatusCode::LOCKED);
        assert_eq!(AdminError::from(VaultError::Decryption).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AdminError::from(WalletError::Vault(VaultError::AlreadyInitialized)).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn provider_errors_map_to_statuses() {
        assert_eq!(
            AdminError::from(ProviderError::UnknownProvider("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AdminError::from(WalletError::from(ProviderError::upstream("a", "boom"))).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn blocking_work_keeps_its_error_and_survives_panics() {
        let locked = blocking(|| Err::<(), _>(VaultError::Locked)).await;
        assert!(matches!(locked, Err(AdminError::Vault(VaultError::Locked))));

        let panicked = blocking(|| -> Result<(), VaultError> { panic!("store exploded") }).await;
        assert_eq!(panicked.unwrap_err().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
