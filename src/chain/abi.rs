//! Compile-time ABI definitions via Alloy `sol!`.

use alloy::sol;

sol! {
    /// Agent registry and signal/prediction log.
    ///
    /// `agents(address)` returns the registration record; the sixth field
    /// is the `isRegistered` flag the idempotent registration path checks
    /// before writing. `price` and `referencePrice` are base-18 fixed
    /// point (1.0 native = 1e18).
    #[sol(rpc)]
    interface IDuckSignals {
        function registerAgent(string name) external;
        function postSignal(string sigType, uint256 confidence, uint256 price, string reason) external;
        function postPrediction(string direction, uint256 confidence, uint256 referencePrice, uint256 targetTime) external;
        function verifyPrediction(uint256 index, uint256 actualPrice) external;

        function agents(address wallet) external view returns (
            string name,
            uint256 totalSignals,
            uint256 totalPredictions,
            uint256 correctPredictions,
            uint256 lastActive,
            bool isRegistered
        );
        function getAgentAccuracy(address wallet) external view returns (uint256);
        function getRecentSignals(uint256 count) external view returns (
            address[] memory agentsOut,
            string[] memory sigTypes,
            uint256[] memory confidences,
            uint256[] memory prices,
            uint256[] memory timestamps
        );
        function getRecentPredictions(uint256 count) external view returns (
            address[] memory agentsOut,
            string[] memory directions,
            uint256[] memory confidences,
            uint256[] memory targetTimes
        );

        event AgentRegistered(address indexed agent, string name);
        event SignalPosted(address indexed agent, string sigType, uint256 confidence, uint256 price);
        event PredictionPosted(address indexed agent, uint256 indexed index, string direction, uint256 targetTime);
        event PredictionVerified(address indexed agent, uint256 indexed index, bool correct);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
    }

    event Transfer(address indexed from, address indexed to, uint256 value);
}

sol! {
    /// Launchpad router: swap quoting plus bonding-curve state for tokens
    /// that have not graduated to a real pool yet.
    #[sol(rpc)]
    interface ILaunchpad {
        function getAmountOut(uint256 amountIn, address tokenIn, address tokenOut) external view returns (uint256 amountOut);
        function bondingProgress(address token) external view returns (uint256 progressBps);
        function isGraduated(address token) external view returns (bool);
    }
}
