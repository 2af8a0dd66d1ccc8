//! Account-nonce (EVM) chain adapter over ethers.
//!
//! ERC-20 calldata is encoded by hand: the calls the gateway makes are few,
//! simple and stable, and this avoids a dependency on contract codegen.

use super::{wrong_family, ChainAdapter, FeeEstimate, PollStatus, SignedTx, UnsignedTx};
use crate::types::{AppError, TxFamily};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, BlockId, BlockNumber, Bytes, TransactionRequest, H256, U256};
use url::Url;

// Function selectors: keccak256(signature)[..4]
const SEL_BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31]; // balanceOf(address)
const SEL_ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e]; // allowance(address,address)
const SEL_APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3]; // approve(address,uint256)
const SEL_DEPOSIT: [u8; 4] = [0xd0, 0xe3, 0x0d, 0xb3]; // deposit()

pub struct EvmAdapter {
    network: String,
    provider: Provider<Http>,
}

impl EvmAdapter {
    pub fn new(network: &str, rpc_url: &str, http: reqwest::Client) -> Result<Self, AppError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| AppError::Internal(format!("invalid rpc url for {network}: {e}")))?;
        Ok(Self {
            network: network.to_string(),
            provider: Provider::new(Http::new_with_client(url, http)),
        })
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Bytes, AppError> {
        let tx: ethers::types::transaction::eip2718::TypedTransaction =
            TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| AppError::Internal(format!("eth_call failed: {e}")))
    }
}

pub(crate) fn parse_address(s: &str) -> Result<Address, AppError> {
    s.trim()
        .parse::<Address>()
        .map_err(|_| AppError::Validation(format!("invalid address: {}", s.trim())))
}

fn u256_to_u128_saturating(v: U256) -> u128 {
    if v > U256::from(u128::MAX) {
        u128::MAX
    } else {
        v.as_u128()
    }
}

fn decode_u256(data: &[u8]) -> Result<U256, AppError> {
    if data.len() < 32 {
        return Err(AppError::Internal(format!(
            "short eth_call return: {} bytes",
            data.len()
        )));
    }
    Ok(U256::from_big_endian(&data[..32]))
}

// ---------------------------------------------------------------------
// Minimal ABI encoding (static arguments + one trailing dynamic array)
// ---------------------------------------------------------------------

pub(crate) fn address_word(addr: Address) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[12..].copy_from_slice(addr.as_bytes());
    w
}

pub(crate) fn u256_word(v: U256) -> [u8; 32] {
    let mut w = [0u8; 32];
    v.to_big_endian(&mut w);
    w
}

pub(crate) fn encode_call(selector: [u8; 4], words: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector);
    for w in words {
        data.extend_from_slice(w);
    }
    data
}

pub(crate) fn erc20_balance_of_calldata(owner: Address) -> Vec<u8> {
    encode_call(SEL_BALANCE_OF, &[address_word(owner)])
}

pub(crate) fn erc20_allowance_calldata(owner: Address, spender: Address) -> Vec<u8> {
    encode_call(SEL_ALLOWANCE, &[address_word(owner), address_word(spender)])
}

pub(crate) fn erc20_approve_calldata(spender: Address, amount: U256) -> Vec<u8> {
    encode_call(SEL_APPROVE, &[address_word(spender), u256_word(amount)])
}

pub(crate) fn weth_deposit_calldata() -> Vec<u8> {
    SEL_DEPOSIT.to_vec()
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn family(&self) -> TxFamily {
        TxFamily::AccountNonce
    }

    fn network(&self) -> &str {
        &self.network
    }

    async fn pending_nonce(&self, address: &str) -> Result<u64, AppError> {
        let addr = parse_address(address)?;
        let nonce = self
            .provider
            .get_transaction_count(addr, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(|e| AppError::Internal(format!("get_transaction_count failed: {e}")))?;
        Ok(nonce.as_u64())
    }

    async fn native_balance(&self, address: &str) -> Result<u128, AppError> {
        let addr = parse_address(address)?;
        let bal = self
            .provider
            .get_balance(addr, None)
            .await
            .map_err(|e| AppError::Internal(format!("get_balance failed: {e}")))?;
        Ok(u256_to_u128_saturating(bal))
    }

    async fn token_balance(&self, owner: &str, token: &str) -> Result<u128, AppError> {
        let owner = parse_address(owner)?;
        let token = parse_address(token)?;
        let out = self
            .eth_call(token, erc20_balance_of_calldata(owner))
            .await?;
        Ok(u256_to_u128_saturating(decode_u256(&out)?))
    }

    async fn token_account_balance(&self, _account: &str) -> Result<u128, AppError> {
        Err(wrong_family("token account lookup", self.family()))
    }

    async fn allowance(
        &self,
        owner: &str,
        spender: &str,
        token: &str,
    ) -> Result<u128, AppError> {
        let owner = parse_address(owner)?;
        let spender = parse_address(spender)?;
        let token = parse_address(token)?;
        let out = self
            .eth_call(token, erc20_allowance_calldata(owner, spender))
            .await?;
        Ok(u256_to_u128_saturating(decode_u256(&out)?))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, AppError> {
        let (max_fee, priority) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| AppError::Internal(format!("fee estimate failed: {e}")))?;
        Ok(FeeEstimate {
            max_fee_per_gas: u256_to_u128_saturating(max_fee),
            priority_fee_per_gas: u256_to_u128_saturating(priority),
        })
    }

    async fn latest_blockhash(&self) -> Result<String, AppError> {
        Err(wrong_family("blockhash lookup", self.family()))
    }

    async fn simulate(&self, tx: &UnsignedTx) -> Result<Option<String>, AppError> {
        let UnsignedTx::AccountNonce(tx) = tx else {
            return Err(wrong_family("account-nonce simulation", self.family()));
        };
        match self.provider.call(tx, None).await {
            Ok(_) => Ok(None),
            Err(e) => Ok(Some(e.to_string())),
        }
    }

    async fn submit(&self, tx: &SignedTx) -> Result<String, AppError> {
        let SignedTx::AccountNonce(raw) = tx else {
            return Err(wrong_family("account-nonce submission", self.family()));
        };
        let pending = self
            .provider
            .send_raw_transaction(Bytes::from(raw.clone()))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(format!("{:?}", pending.tx_hash()))
    }

    async fn poll(&self, handle: &str) -> Result<PollStatus, AppError> {
        let hash = handle
            .parse::<H256>()
            .map_err(|_| AppError::Validation("invalid transaction hash".into()))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| AppError::Internal(format!("get_transaction_receipt failed: {e}")))?;
        let Some(receipt) = receipt else {
            return Ok(PollStatus::Pending);
        };
        let fee = match (receipt.gas_used, receipt.effective_gas_price) {
            (Some(gas), Some(price)) => Some(u256_to_u128_saturating(gas * price)),
            _ => None,
        };
        match receipt.status.map(|s| s.as_u64()) {
            Some(1) => Ok(PollStatus::Confirmed { fee }),
            _ => Ok(PollStatus::Failed { reason: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_calldata_layout() {
        let spender: Address = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"
            .parse()
            .unwrap();
        let data = erc20_approve_calldata(spender, U256::from(1_000u64));
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(&data[..4], &SEL_APPROVE);
        // Address is right-aligned in its word.
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], spender.as_bytes());
        // Amount is big-endian in the last word.
        assert_eq!(&data[36 + 30..], &[0x03, 0xe8]);
    }

    #[test]
    fn allowance_calldata_has_two_words() {
        let a: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        let b: Address = "0x0000000000000000000000000000000000000002".parse().unwrap();
        let data = erc20_allowance_calldata(a, b);
        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &SEL_ALLOWANCE);
        assert_eq!(data[35], 1);
        assert_eq!(data[67], 2);
    }

    #[test]
    fn deposit_calldata_is_bare_selector() {
        assert_eq!(weth_deposit_calldata(), vec![0xd0, 0xe3, 0x0d, 0xb3]);
    }

    #[test]
    fn saturating_u128_conversion() {
        assert_eq!(u256_to_u128_saturating(U256::from(7u64)), 7);
        assert_eq!(u256_to_u128_saturating(U256::MAX), u128::MAX);
    }
}
