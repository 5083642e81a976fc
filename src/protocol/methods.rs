//! The fixed capability allow-list and per-method routing class.

use std::fmt;
use std::str::FromStr;

/// Every method a page may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    ChainId,
    NetVersion,
    Accounts,
    RequestAccounts,
    BlockNumber,
    GetBalance,
    GetCode,
    GetStorageAt,
    GetLogs,
    GetBlockByNumber,
    GetTransactionByHash,
    GetTransactionReceipt,
    GetTransactionCount,
    GasPrice,
    MaxPriorityFeePerGas,
    EstimateGas,
    SendTransaction,
    PersonalSign,
    SignTypedDataV4,
    EthSign,
    SwitchChain,
    AddChain,
    GetPermissions,
    RequestPermissions,
    RevokePermissions,
}

/// How the dispatcher handles a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Answered from session state, no network and no approval.
    Local,
    /// Read-only call forwarded to the active adapter.
    ChainRead,
    /// Mutates the caller's session without a prompt.
    Session,
    /// Suspends until a human decision is recorded.
    Approval,
    /// Known but refused with a structured capability error.
    Rejected,
}

impl Method {
    pub const ALL: [Method; 25] = [
        Method::ChainId,
        Method::NetVersion,
        Method::Accounts,
        Method::RequestAccounts,
        Method::BlockNumber,
        Method::GetBalance,
        Method::GetCode,
        Method::GetStorageAt,
        Method::GetLogs,
        Method::GetBlockByNumber,
        Method::GetTransactionByHash,
        Method::GetTransactionReceipt,
        Method::GetTransactionCount,
        Method::GasPrice,
        Method::MaxPriorityFeePerGas,
        Method::EstimateGas,
        Method::SendTransaction,
        Method::PersonalSign,
        Method::SignTypedDataV4,
        Method::EthSign,
        Method::SwitchChain,
        Method::AddChain,
        Method::GetPermissions,
        Method::RequestPermissions,
        Method::RevokePermissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ChainId => "eth_chainId",
            Method::NetVersion => "net_version",
            Method::Accounts => "eth_accounts",
            Method::RequestAccounts => "eth_requestAccounts",
            Method::BlockNumber => "eth_blockNumber",
            Method::GetBalance => "eth_getBalance",
            Method::GetCode => "eth_getCode",
            Method::GetStorageAt => "eth_getStorageAt",
            Method::GetLogs => "eth_getLogs",
            Method::GetBlockByNumber => "eth_getBlockByNumber",
            Method::GetTransactionByHash => "eth_getTransactionByHash",
            Method::GetTransactionReceipt => "eth_getTransactionReceipt",
            Method::GetTransactionCount => "eth_getTransactionCount",
            Method::GasPrice => "eth_gasPrice",
            Method::MaxPriorityFeePerGas => "eth_maxPriorityFeePerGas",
            Method::EstimateGas => "eth_estimateGas",
            Method::SendTransaction => "eth_sendTransaction",
            Method::PersonalSign => "personal_sign",
            Method::SignTypedDataV4 => "eth_signTypedData_v4",
            Method::EthSign => "eth_sign",
            Method::SwitchChain => "wallet_switchEthereumChain",
            Method::AddChain => "wallet_addEthereumChain",
            Method::GetPermissions => "wallet_getPermissions",
            Method::RequestPermissions => "wallet_requestPermissions",
            Method::RevokePermissions => "wallet_revokePermissions",
        }
    }

    pub fn route(&self) -> Route {
        match self {
            Method::ChainId | Method::NetVersion | Method::Accounts | Method::GetPermissions => Route::Local,
            Method::BlockNumber
            | Method::GetBalance
            | Method::GetCode
            | Method::GetStorageAt
            | Method::GetLogs
            | Method::GetBlockByNumber
            | Method::GetTransactionByHash
            | Method::GetTransactionReceipt
            | Method::GetTransactionCount
            | Method::GasPrice
            | Method::MaxPriorityFeePerGas
            | Method::EstimateGas => Route::ChainRead,
            Method::SwitchChain | Method::RevokePermissions => Route::Session,
            Method::RequestAccounts
            | Method::RequestPermissions
            | Method::SendTransaction
            | Method::PersonalSign
            | Method::SignTypedDataV4
            | Method::AddChain => Route::Approval,
            Method::EthSign => Route::Rejected,
        }
    }

    /// Methods whose prompt needs page context (title, origin, intent).
    pub fn needs_human_judgment(&self) -> bool {
        self.route() == Route::Approval
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for names outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}
