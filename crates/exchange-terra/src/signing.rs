//! Legacy amino-JSON transaction signing.
//!
//! The sign document is the canonical (key-sorted, whitespace-free) JSON of a
//! `StdSignDoc`; its SHA-256 digest is signed with the keeper's secp256k1 key
//! and the result is wrapped in a `StdTx` ready for `POST /txs`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use neutral_keeper_core::{KeeperConfig, LedgerMsg, SignedTx, SigningError, TxSigner};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::wallet::Wallet;

/// Broadcast mode that waits for block inclusion so chain-level failures surface.
const BROADCAST_MODE: &str = "block";

/// Gas and fee settings applied to every keeper transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
    pub gas_per_message: u64,
    pub gas_price: Decimal,
    pub denom: String,
}

impl FeeSchedule {
    #[must_use]
    pub fn from_config(config: &KeeperConfig) -> Self {
        Self {
            gas_per_message: config.gas_per_message,
            gas_price: config.gas_price,
            denom: config.fee_denom.clone(),
        }
    }

    /// Gas limit and fee amount for a transaction of `msg_count` messages.
    #[must_use]
    pub fn fee_for(&self, msg_count: usize) -> (u64, Decimal) {
        let gas = self
            .gas_per_message
            .saturating_mul(u64::try_from(msg_count).unwrap_or(u64::MAX));
        let amount = (Decimal::from(gas) * self.gas_price).ceil();
        (gas, amount)
    }
}

pub struct AminoSigner {
    wallet: Wallet,
    chain_id: String,
    account_number: u64,
    fees: FeeSchedule,
}

impl AminoSigner {
    #[must_use]
    pub fn new(wallet: Wallet, chain_id: impl Into<String>, account_number: u64, fees: FeeSchedule) -> Self {
        Self {
            wallet,
            chain_id: chain_id.into(),
            account_number,
            fees,
        }
    }

    fn fee_json(&self, msg_count: usize) -> Value {
        let (gas, amount) = self.fees.fee_for(msg_count);
        json!({
            "amount": [{"denom": self.fees.denom, "amount": amount.normalize().to_string()}],
            "gas": gas.to_string(),
        })
    }

    /// Builds the document whose canonical JSON bytes are signed.
    #[must_use]
    pub fn sign_doc(&self, msgs: &[LedgerMsg], memo: &str, sequence: u64) -> Value {
        json!({
            "account_number": self.account_number.to_string(),
            "chain_id": self.chain_id,
            "fee": self.fee_json(msgs.len()),
            "memo": memo,
            "msgs": msgs.iter().map(amino_msg).collect::<Vec<_>>(),
            "sequence": sequence.to_string(),
        })
    }
}

impl std::fmt::Debug for AminoSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AminoSigner")
            .field("address", &self.wallet.address())
            .field("chain_id", &self.chain_id)
            .field("account_number", &self.account_number)
            .finish_non_exhaustive()
    }
}

impl TxSigner for AminoSigner {
    fn address(&self) -> &str {
        self.wallet.address()
    }

    fn sign(&self, msgs: &[LedgerMsg], memo: &str, sequence: u64) -> Result<SignedTx, SigningError> {
        if msgs.is_empty() {
            return Err(SigningError::Encoding("transaction has no messages".to_string()));
        }

        let doc = self.sign_doc(msgs, memo, sequence);
        // serde_json maps are key-sorted, which is exactly the canonical form.
        let bytes = serde_json::to_vec(&doc).map_err(|e| SigningError::Encoding(e.to_string()))?;
        let signature = self
            .wallet
            .sign(&bytes)
            .map_err(|e| SigningError::Signature(e.to_string()))?;

        let body = json!({
            "tx": {
                "msg": doc["msgs"].clone(),
                "fee": doc["fee"].clone(),
                "signatures": [{
                    "signature": BASE64.encode(signature),
                    "pub_key": {
                        "type": "tendermint/PubKeySecp256k1",
                        "value": BASE64.encode(self.wallet.public_key()),
                    },
                    "account_number": self.account_number.to_string(),
                    "sequence": sequence.to_string(),
                }],
                "memo": memo,
            },
            "mode": BROADCAST_MODE,
        });

        Ok(SignedTx {
            sequence,
            memo: memo.to_string(),
            msg_count: msgs.len(),
            body,
        })
    }
}

/// Amino JSON form of a keeper message.
#[must_use]
pub fn amino_msg(msg: &LedgerMsg) -> Value {
    match msg {
        LedgerMsg::Migrate {
            admin,
            contract,
            new_code_id,
            migrate_msg,
        } => json!({
            "type": "wasm/MsgMigrateContract",
            "value": {
                "admin": admin,
                "contract": contract,
                "new_code_id": new_code_id.to_string(),
                "migrate_msg": migrate_msg,
            }
        }),
        LedgerMsg::Execute {
            sender,
            contract,
            execute_msg,
            coins,
        } => json!({
            "type": "wasm/MsgExecuteContract",
            "value": {
                "sender": sender,
                "contract": contract,
                "execute_msg": execute_msg,
                "coins": coins,
            }
        }),
    }
}
