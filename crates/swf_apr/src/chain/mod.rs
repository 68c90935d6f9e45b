//! Contract reads over JSON-RPC, response caching, and value normalization.

mod cache;
mod normalize;
mod rpc;

pub use cache::{Cache, CacheError};
pub use normalize::{
    encode_address_arg, normalize_address, parse_block_tag, parse_quantity, parse_selector,
    to_whole_tokens, NormalizeError, BALANCE_OF_SELECTOR, TOTAL_ASSETS_SELECTOR,
};
pub use rpc::{BlockTag, RpcClient, RpcConfig, RpcError};
