//! Definitions of Solidity functions called during deployment and configuration

use alloy_sol_types::sol;

sol! {
    /// The upgradeable strategy interface, reached through its proxy
    interface IStrategy {
        function pool() external view returns (address);
        function collateralToken() external view returns (address);
        function governor() external view returns (address);
        function keepers() external view returns (address[] memory);
        function isActive() external view returns (bool);
        function poolAccountant() external view returns (address);
        function addKeeper(address keeperAddress) external;
        function approveToken(uint256 approvalAmount) external;
        function upgradeToAndCall(address newImplementation, bytes memory data) external payable;
    }

    /// The accounting contract of a Vesper pool
    interface IPoolAccountant {
        function addStrategy(address strategy, uint256 debtRatio, uint256 externalDepositFee) external;
    }

    /// The subset of ERC20 read during configuration
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
    }
}
