//! Unsigned Ethereum transactions.
//!
//! Accepted encodings:
//!
//! - legacy: `rlp([nonce, gasPrice, gasLimit, to, value, data])`, optionally
//!   with the EIP-155 trailer `[chainId, "", ""]`
//! - EIP-1559: `0x02 || rlp([chainId, nonce, maxPriorityFeePerGas,
//!   maxFeePerGas, gasLimit, to, value, data, accessList])`
//!
//! Input must be the canonical encoding of the decoded transaction: integers
//! without leading zeros, minimal length prefixes, no trailing bytes.

use keyward_crypto::keccak256;
use rlp::{Rlp, RlpStream};

use super::MetadataEthereum;
use crate::error::CustodyError;

/// EIP-2718 type byte of EIP-1559 transactions.
pub const EIP1559_TX_TYPE: u8 = 0x02;

fn parse_err(msg: impl Into<String>) -> CustodyError {
    CustodyError::TransferParse(msg.into())
}

/// Pre-EIP-1559 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    /// Sender nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Recipient, `None` for contract creation.
    pub to: Option<[u8; 20]>,
    /// Value in wei.
    pub value: u128,
    /// Call data.
    pub data: Vec<u8>,
    /// EIP-155 chain id, if the encoding carried the trailer.
    pub chain_id: Option<u64>,
}

/// EIP-1559 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    /// Chain id.
    pub chain_id: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// Priority fee per gas.
    pub max_priority_fee_per_gas: u128,
    /// Max fee per gas.
    pub max_fee_per_gas: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Recipient, `None` for contract creation.
    pub to: Option<[u8; 20]>,
    /// Value in wei.
    pub value: u128,
    /// Call data.
    pub data: Vec<u8>,
    /// Access list, kept as its raw RLP list.
    pub access_list: Vec<u8>,
}

/// A decoded unsigned Ethereum transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EthereumTransaction {
    /// Legacy or EIP-155 transaction.
    Legacy(LegacyTransaction),
    /// Type 2 transaction.
    Eip1559(Eip1559Transaction),
}

fn trimmed(v: u128) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn append_uint(stream: &mut RlpStream, v: u128) {
    stream.append(&trimmed(v).as_slice());
}

fn append_to(stream: &mut RlpStream, to: &Option<[u8; 20]>) {
    match to {
        Some(addr) => stream.append(&addr.as_slice()),
        None => stream.append_empty_data(),
    };
}

fn read_uint(list: &Rlp, index: usize, field: &str, max_len: usize) -> Result<u128, CustodyError> {
    let item = list.at(index).map_err(|e| parse_err(format!("{field}: {e}")))?;
    if item.is_list() {
        return Err(parse_err(format!("{field}: expected integer, found list")));
    }
    let bytes = item.data().map_err(|e| parse_err(format!("{field}: {e}")))?;
    if bytes.first() == Some(&0) {
        return Err(parse_err(format!("{field}: leading zero")));
    }
    if bytes.len() > max_len {
        return Err(parse_err(format!("{field}: overflows {max_len} bytes")));
    }
    Ok(bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}

fn read_u64(list: &Rlp, index: usize, field: &str) -> Result<u64, CustodyError> {
    read_uint(list, index, field, 8).map(|v| v as u64)
}

fn read_bytes(list: &Rlp, index: usize, field: &str) -> Result<Vec<u8>, CustodyError> {
    let item = list.at(index).map_err(|e| parse_err(format!("{field}: {e}")))?;
    if item.is_list() {
        return Err(parse_err(format!("{field}: expected bytes, found list")));
    }
    item.data()
        .map(<[u8]>::to_vec)
        .map_err(|e| parse_err(format!("{field}: {e}")))
}

fn read_to(list: &Rlp, index: usize) -> Result<Option<[u8; 20]>, CustodyError> {
    let bytes = read_bytes(list, index, "to")?;
    match bytes.len() {
        0 => Ok(None),
        20 => {
            let mut addr = [0u8; 20];
            addr.copy_from_slice(&bytes);
            Ok(Some(addr))
        },
        n => Err(parse_err(format!("to: expected 0 or 20 bytes, got {n}"))),
    }
}

fn open_list<'a>(bytes: &'a [u8], expected: &[usize]) -> Result<(Rlp<'a>, usize), CustodyError> {
    let rlp = Rlp::new(bytes);
    if !rlp.is_list() {
        return Err(parse_err("transaction must be an RLP list"));
    }
    let count = rlp.item_count().map_err(|e| parse_err(e.to_string()))?;
    if !expected.contains(&count) {
        return Err(parse_err(format!("unexpected field count {count}")));
    }
    Ok((rlp, count))
}

impl LegacyTransaction {
    fn decode(bytes: &[u8]) -> Result<Self, CustodyError> {
        let (rlp, count) = open_list(bytes, &[6, 9])?;
        let chain_id = if count == 9 {
            let chain_id = read_u64(&rlp, 6, "chain_id")?;
            if chain_id == 0 {
                return Err(parse_err("chain_id: EIP-155 chain id must be non-zero"));
            }
            if !read_bytes(&rlp, 7, "r")?.is_empty() || !read_bytes(&rlp, 8, "s")?.is_empty() {
                return Err(parse_err("transaction is already signed"));
            }
            Some(chain_id)
        } else {
            None
        };

        Ok(Self {
            nonce: read_u64(&rlp, 0, "nonce")?,
            gas_price: read_uint(&rlp, 1, "gas_price", 16)?,
            gas_limit: read_u64(&rlp, 2, "gas_limit")?,
            to: read_to(&rlp, 3)?,
            value: read_uint(&rlp, 4, "value", 16)?,
            data: read_bytes(&rlp, 5, "data")?,
            chain_id,
        })
    }

    /// RLP of the unsigned transaction, with the EIP-155 trailer for `chain_id`.
    pub fn rlp_unsigned(&self, chain_id: Option<u64>) -> Vec<u8> {
        let mut stream = RlpStream::new_list(if chain_id.is_some() { 9 } else { 6 });
        append_uint(&mut stream, u128::from(self.nonce));
        append_uint(&mut stream, self.gas_price);
        append_uint(&mut stream, u128::from(self.gas_limit));
        append_to(&mut stream, &self.to);
        append_uint(&mut stream, self.value);
        stream.append(&self.data);
        if let Some(chain_id) = chain_id {
            append_uint(&mut stream, u128::from(chain_id));
            stream.append_empty_data();
            stream.append_empty_data();
        }
        stream.out().to_vec()
    }
}

impl Eip1559Transaction {
    fn decode(bytes: &[u8]) -> Result<Self, CustodyError> {
        let (rlp, _) = open_list(bytes, &[9])?;
        let access_list = rlp.at(8).map_err(|e| parse_err(format!("access_list: {e}")))?;
        if !access_list.is_list() {
            return Err(parse_err("access_list: expected list"));
        }

        Ok(Self {
            chain_id: read_u64(&rlp, 0, "chain_id")?,
            nonce: read_u64(&rlp, 1, "nonce")?,
            max_priority_fee_per_gas: read_uint(&rlp, 2, "max_priority_fee_per_gas", 16)?,
            max_fee_per_gas: read_uint(&rlp, 3, "max_fee_per_gas", 16)?,
            gas_limit: read_u64(&rlp, 4, "gas_limit")?,
            to: read_to(&rlp, 5)?,
            value: read_uint(&rlp, 6, "value", 16)?,
            data: read_bytes(&rlp, 7, "data")?,
            access_list: access_list.as_raw().to_vec(),
        })
    }

    /// Typed envelope `0x02 || rlp(fields)`.
    pub fn rlp_unsigned(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        append_uint(&mut stream, u128::from(self.chain_id));
        append_uint(&mut stream, u128::from(self.nonce));
        append_uint(&mut stream, self.max_priority_fee_per_gas);
        append_uint(&mut stream, self.max_fee_per_gas);
        append_uint(&mut stream, u128::from(self.gas_limit));
        append_to(&mut stream, &self.to);
        append_uint(&mut stream, self.value);
        stream.append(&self.data);
        stream.append_raw(&self.access_list, 1);

        let mut out = vec![EIP1559_TX_TYPE];
        out.extend_from_slice(&stream.out());
        out
    }
}

impl EthereumTransaction {
    /// Decodes a canonical unsigned transaction.
    pub fn decode(input: &[u8]) -> Result<Self, CustodyError> {
        let tx = match input.first() {
            None => return Err(parse_err("empty transaction")),
            Some(&EIP1559_TX_TYPE) => EthereumTransaction::Eip1559(Eip1559Transaction::decode(&input[1..])?),
            Some(b) if *b >= 0xc0 => EthereumTransaction::Legacy(LegacyTransaction::decode(input)?),
            Some(b) => return Err(parse_err(format!("unsupported transaction type 0x{b:02x}"))),
        };
        if tx.encode() != input {
            return Err(parse_err("non-canonical encoding"));
        }
        Ok(tx)
    }

    /// Encoding in the form it was decoded from.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            EthereumTransaction::Legacy(tx) => tx.rlp_unsigned(tx.chain_id),
            EthereumTransaction::Eip1559(tx) => tx.rlp_unsigned(),
        }
    }

    /// Hash a signer must sign to authorize the transaction on `chain_id`.
    pub fn signing_hash(&self, chain_id: u64) -> Result<[u8; 32], CustodyError> {
        if let Some(tx_chain) = self.chain_id() {
            if tx_chain != chain_id {
                return Err(parse_err(format!(
                    "transaction chain id {tx_chain} does not match {chain_id}"
                )));
            }
        }
        Ok(match self {
            EthereumTransaction::Legacy(tx) => keccak256(&tx.rlp_unsigned(Some(chain_id))),
            EthereumTransaction::Eip1559(tx) => keccak256(&tx.rlp_unsigned()),
        })
    }

    /// Chain id carried by the encoding, if any.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            EthereumTransaction::Legacy(tx) => tx.chain_id,
            EthereumTransaction::Eip1559(tx) => Some(tx.chain_id),
        }
    }

    /// Sender nonce.
    pub fn nonce(&self) -> u64 {
        match self {
            EthereumTransaction::Legacy(tx) => tx.nonce,
            EthereumTransaction::Eip1559(tx) => tx.nonce,
        }
    }

    /// Recipient.
    pub fn to(&self) -> Option<[u8; 20]> {
        match self {
            EthereumTransaction::Legacy(tx) => tx.to,
            EthereumTransaction::Eip1559(tx) => tx.to,
        }
    }

    /// Transferred value in wei.
    pub fn value(&self) -> u128 {
        match self {
            EthereumTransaction::Legacy(tx) => tx.value,
            EthereumTransaction::Eip1559(tx) => tx.value,
        }
    }
}

/// Returns the signing hash of the transaction in `input`.
pub fn parse(input: &[u8], meta: &MetadataEthereum) -> Result<Vec<u8>, CustodyError> {
    let tx = EthereumTransaction::decode(input)?;
    Ok(tx.signing_hash(meta.chain_id)?.to_vec())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    // Example transaction from EIP-155.
    const EIP155_SIGNING_DATA: &str =
        "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080";
    const EIP155_SIGNING_HASH: &str = "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53";

    fn eip155_legacy() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21000,
            to: Some([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            chain_id: None,
        }
    }

    fn eip1559(chain_id: u64) -> Eip1559Transaction {
        Eip1559Transaction {
            chain_id,
            nonce: 3,
            max_priority_fee_per_gas: 1_500_000_000,
            max_fee_per_gas: 30_000_000_000,
            gas_limit: 21000,
            to: Some([0xaa; 20]),
            value: 5,
            data: vec![0xde, 0xad],
            access_list: vec![0xc0],
        }
    }

    #[test]
    fn test_eip155_vector() {
        let input = hex::decode(EIP155_SIGNING_DATA).unwrap();
        let hash = parse(&input, &MetadataEthereum { chain_id: 1 }).unwrap();
        assert_eq!(hex::encode(hash), EIP155_SIGNING_HASH);
    }

    #[test]
    fn test_legacy_without_trailer_uses_metadata_chain() {
        let input = eip155_legacy().rlp_unsigned(None);
        let hash = parse(&input, &MetadataEthereum { chain_id: 1 }).unwrap();
        assert_eq!(hex::encode(hash), EIP155_SIGNING_HASH);
    }

    #[test]
    fn test_chain_mismatch() {
        let input = hex::decode(EIP155_SIGNING_DATA).unwrap();
        assert!(matches!(
            parse(&input, &MetadataEthereum { chain_id: 5 }),
            Err(CustodyError::TransferParse(_))
        ));

        let input = eip1559(1).rlp_unsigned();
        assert!(parse(&input, &MetadataEthereum { chain_id: 5 }).is_err());
    }

    #[test]
    fn test_eip1559_hash_covers_envelope() {
        let input = eip1559(11155111).rlp_unsigned();
        assert_eq!(input[0], EIP1559_TX_TYPE);
        let hash = parse(&input, &MetadataEthereum { chain_id: 11155111 }).unwrap();
        assert_eq!(hash, keccak256(&input).to_vec());

        let tx = EthereumTransaction::decode(&input).unwrap();
        assert_eq!(tx, EthereumTransaction::Eip1559(eip1559(11155111)));
        assert_eq!(tx.value(), 5);
        assert_eq!(tx.nonce(), 3);
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut input = hex::decode(EIP155_SIGNING_DATA).unwrap();
        input.push(0x00);
        assert!(EthereumTransaction::decode(&input).is_err());
    }

    #[test]
    fn test_rejects_leading_zero_integer() {
        let mut stream = RlpStream::new_list(6);
        stream.append(&[0x00u8, 0x09].as_slice());
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x52u8, 0x08].as_slice());
        stream.append_empty_data();
        stream.append_empty_data();
        stream.append_empty_data();
        let input = stream.out().to_vec();
        assert!(EthereumTransaction::decode(&input).is_err());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        // wrong recipient length
        let mut stream = RlpStream::new_list(6);
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x11u8; 19].as_slice());
        stream.append_empty_data();
        stream.append_empty_data();
        assert!(EthereumTransaction::decode(&stream.out()).is_err());

        assert!(EthereumTransaction::decode(&[]).is_err());
        assert!(EthereumTransaction::decode(&[0x01, 0xc0]).is_err());
        assert!(EthereumTransaction::decode(&[0xc0]).is_err());
        assert!(EthereumTransaction::decode(b"\x80").is_err());
    }

    #[test]
    fn test_rejects_signed_legacy() {
        let mut stream = RlpStream::new_list(9);
        stream.append(&[0x09u8].as_slice());
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x52u8, 0x08].as_slice());
        stream.append_empty_data();
        stream.append_empty_data();
        stream.append_empty_data();
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x01u8].as_slice());
        stream.append(&[0x01u8].as_slice());
        assert!(EthereumTransaction::decode(&stream.out()).is_err());
    }
}
