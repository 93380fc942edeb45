//! Contract interfaces called or watched on EVM chains
//!
//! Uniswap V2 routers, factories and pairs (PancakeSwap, QuickSwap and
//! TraderJoe share the ABI) plus the two ERC-20 calls a trade needs.

use alloy_primitives::U256;
use alloy_sol_types::sol;

sol! {
    interface IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);

        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline)
            external payable returns (uint256[] memory amounts);

        function swapExactTokensForETH(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    /// TraderJoe names the native asset AVAX
    interface IJoeRouter02 {
        function swapExactAVAXForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline)
            external payable returns (uint256[] memory amounts);

        function swapExactTokensForAVAX(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    interface IUniswapV2Factory {
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 allPairsLength);
    }

    interface IUniswapV2Pair {
        event Sync(uint112 reserve0, uint112 reserve1);
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256 balance);
        function approve(address spender, uint256 value) external returns (bool success);
    }
}

/// Base-unit amount as a `uint256`
pub fn uint(amount: u128) -> U256 {
    U256::from(amount)
}

/// A `uint256` as base units; `None` past `u128::MAX`
pub fn amount(value: U256) -> Option<u128> {
    u128::try_from(value).ok()
}
