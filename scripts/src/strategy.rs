//! Strategy declarations, and the deploy-then-configure flow applied to each of them
//!
//! A declarations file is a JSON array processed in order. Each entry names the strategy
//! instance, its contract type with the typed initializer arguments of that type, and
//! optional configuration overrides:
//!
//! ```json
//! {
//!   "alias": "Yearn_ETH",
//!   "contract": "Yearn",
//!   "initialize": { "pool": "0x..", "swapper": "0x..", "receiptToken": "0x..", "name": "Yearn_ETH" },
//!   "config": { "keeper": "0x..", "debtRatio": 9000 }
//! }
//! ```

use std::{collections::HashSet, path::Path, str::FromStr};

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    chain::read,
    constants::{DEFAULT_DEBT_RATIO, DEFAULT_EXTERNAL_DEPOSIT_FEE, DEFAULT_KEEPER},
    context::DeployContext,
    deploy::{deploy_or_upgrade, DeployParams, DeployResult},
    errors::ScriptError,
    governance::{execute_as_governor, queue_for_multisig, PrivilegedCall},
    initializer::{InitArg, Initializer},
    solidity::{IPoolAccountant, IStrategy, IERC20},
    utils::{parse_address, read_json_file},
    verify::verify_contract,
};

// ----------------
// | Declarations |
// ----------------

/// A strategy instance to deploy and configure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDeclaration")]
pub struct StrategyDeclaration {
    /// The name of the instance, which names its deployment records
    pub alias: String,
    /// The contract type and its initializer arguments
    pub init: StrategyInit,
    /// Configuration applied after deployment
    pub config: ConfigParams,
}

/// A declaration as written in the declarations file, before its initializer is typed
#[derive(Deserialize)]
struct RawDeclaration {
    /// The deployment alias
    alias: String,
    /// The strategy contract name
    contract: String,
    /// The untyped initializer arguments
    initialize: Value,
    /// Post-deploy configuration
    #[serde(default)]
    config: ConfigParams,
}

impl TryFrom<RawDeclaration> for StrategyDeclaration {
    type Error = String;

    fn try_from(raw: RawDeclaration) -> Result<Self, Self::Error> {
        let init = serde_json::from_value(json!({
            "contract": raw.contract,
            "initialize": raw.initialize,
        }))
        .map_err(|e| format!("{}: {}", raw.alias, e))?;

        Ok(Self {
            alias: raw.alias,
            init,
            config: raw.config,
        })
    }
}

impl FromStr for StrategyDeclaration {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(|e| ScriptError::Serde(e.to_string()))
    }
}

/// Post-deployment configuration of a strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigParams {
    /// The keeper to add, defaults to the Vesper keeper
    pub keeper: Option<Address>,
    /// The debt ratio registered with the pool accountant
    pub debt_ratio: Option<u64>,
    /// The external deposit fee registered with the pool accountant
    pub external_deposit_fee: Option<u64>,
}

/// The initializer arguments of every supported strategy contract
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "contract", content = "initialize")]
pub enum StrategyInit {
    /// Lends the collateral on Aave V3
    AaveV3(AaveV3Init),
    /// Borrows on Aave V3 against the collateral and deposits into a Vesper pool
    AaveV3VesperBorrow(AaveV3BorrowInit),
    /// [`StrategyInit::AaveV3VesperBorrow`] with stETH collateral wrapped as wstETH
    AaveV3VesperBorrowForStETH(AaveV3BorrowForStEthInit),
    /// Borrows on Aave V3 against the collateral and deposits into a Sommelier cellar
    AaveV3SommelierBorrow(AaveV3BorrowInit),
    /// [`StrategyInit::AaveV3SommelierBorrow`] with stETH collateral wrapped as wstETH
    AaveV3SommelierBorrowForStETH(AaveV3BorrowForStEthInit),
    /// Supplies the collateral to a Compound V3 market
    CompoundV3(CompoundV3Init),
    /// Borrows from a Compound V3 market against the collateral
    CompoundV3Borrow(CompoundV3BorrowInit),
    /// Borrows from Compound V3 and deposits into a Vesper pool
    CompoundV3VesperBorrow(CompoundV3VesperBorrowInit),
    /// Provides liquidity to a Curve pool
    Curve(CurveParams),
    /// Provides liquidity to a Curve pool and stakes on Convex
    Convex(ConvexInit),
    /// Deposits into an Euler V2 vault
    EulerV2(VaultInit),
    /// Lends on an Extra Finance reserve
    ExtraFinance(ExtraFinanceInit),
    /// Lends to a Fraxlend pair
    FraxlendV1(VaultInit),
    /// Borrows from a Fraxlend pair and deposits into a Vesper pool
    FraxlendV1VesperBorrow(FraxlendV1BorrowInit),
    /// Deposits into a Morpho vault
    MorphoVault(VaultInit),
    /// Deposits into a Sommelier cellar
    Sommelier(VaultInit),
    /// Provides liquidity to a Stargate V2 pool
    StargateV2(StargateV2Init),
    /// Deposits into a Yearn vault
    Yearn(VaultInit),
}

/// Strategies depositing into a single vault-like receipt token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The vault, cellar or lending pair the strategy deposits into
    pub receipt_token: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::AaveV3`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaveV3Init {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The aToken
    pub receipt_token: Address,
    /// The Aave pool addresses provider
    pub pool_addresses_provider: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of the Aave V3 borrow strategies
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaveV3BorrowInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The token received for the deposit
    pub receipt_token: Address,
    /// The token borrowed against the collateral
    pub borrow_token: Address,
    /// The Aave pool addresses provider
    pub pool_addresses_provider: Address,
    /// The Vesper pool or Sommelier cellar the borrowed token is deposited into
    pub borrow_destination: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of the Aave V3 borrow strategies for stETH
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AaveV3BorrowForStEthInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The token received for the deposit
    pub receipt_token: Address,
    /// The token borrowed against the collateral
    pub borrow_token: Address,
    /// The Aave pool addresses provider
    pub pool_addresses_provider: Address,
    /// The Vesper pool or Sommelier cellar the borrowed token is deposited into
    pub borrow_destination: Address,
    /// The wstETH token
    #[serde(rename = "wstETH")]
    pub wst_eth: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::CompoundV3`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundV3Init {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Compound rewards contract
    pub rewards: Address,
    /// The COMP token
    pub reward_token: Address,
    /// The Compound V3 market
    pub comet: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::CompoundV3Borrow`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundV3BorrowInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Compound rewards contract
    pub rewards: Address,
    /// The COMP token
    pub reward_token: Address,
    /// The Compound V3 market
    pub comet: Address,
    /// The token borrowed against the collateral
    pub borrow_token: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::CompoundV3VesperBorrow`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundV3VesperBorrowInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Compound rewards contract
    pub rewards: Address,
    /// The COMP token
    pub reward_token: Address,
    /// The Compound V3 market
    pub comet: Address,
    /// The token borrowed against the collateral
    pub borrow_token: Address,
    /// The Vesper pool the borrowed token is deposited into
    pub vesper_pool: Address,
    /// The strategy name
    pub name: String,
}

/// The struct every Curve-based strategy is initialized with
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveParams {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Curve pool
    pub curve_pool: Address,
    /// Zero when the pool needs no zap
    #[serde(default)]
    pub curve_pool_zap: Address,
    /// Only present on contract versions that take the CRV token explicitly
    #[serde(default)]
    pub curve_token: Option<Address>,
    /// The Curve deposit-and-stake helper
    pub deposit_and_stake: Address,
    /// Whether the Curve pool takes dynamic amount arrays
    pub use_dynamic_array: bool,
    /// In basis points
    pub slippage: u64,
    /// The WETH token
    pub weth: Address,
    /// The Vesper price oracle
    pub master_oracle: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::Convex`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvexInit {
    /// The Curve parameters
    pub params: CurveParams,
    /// The Convex booster
    pub booster: Address,
    /// Only present on contract versions that take the CVX token explicitly
    #[serde(default)]
    pub cvx: Option<Address>,
    /// The Convex pool ID
    pub convex_pool_id: u64,
}

/// Initializer arguments of [`StrategyInit::ExtraFinance`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraFinanceInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Extra Finance lending pool
    pub lending_pool: Address,
    /// The Extra Finance reserve ID
    pub reserve_id: u64,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::FraxlendV1VesperBorrow`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraxlendV1BorrowInit {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Fraxlend pair
    pub fraxlend_pair: Address,
    /// The token borrowed against the collateral
    pub borrow_token: Address,
    /// The Vesper pool the borrowed token is deposited into
    pub vesper_pool: Address,
    /// The strategy name
    pub name: String,
}

/// Initializer arguments of [`StrategyInit::StargateV2`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StargateV2Init {
    /// The Vesper pool the strategy serves
    pub pool: Address,
    /// The swapper used to sell rewards
    pub swapper: Address,
    /// The Stargate pool
    pub stargate_pool: Address,
    /// The Stargate staking contract
    pub stargate_staking: Address,
    /// The strategy name
    pub name: String,
}

impl CurveParams {
    /// The Curve params as an initializer tuple
    fn to_arg(&self) -> InitArg {
        let mut fields = vec![
            ("pool", InitArg::Address(self.pool)),
            ("swapper", InitArg::Address(self.swapper)),
            ("curvePool", InitArg::Address(self.curve_pool)),
            ("curvePoolZap", InitArg::Address(self.curve_pool_zap)),
            ("depositAndStake", InitArg::Address(self.deposit_and_stake)),
            ("useDynamicArray", InitArg::Bool(self.use_dynamic_array)),
            ("slippage", InitArg::uint(self.slippage)),
            ("weth", InitArg::Address(self.weth)),
            ("masterOracle", InitArg::Address(self.master_oracle)),
            ("name", InitArg::String(self.name.clone())),
        ];
        if let Some(curve_token) = self.curve_token {
            fields.push(("curveToken", InitArg::Address(curve_token)));
        }

        InitArg::structure(fields)
    }
}

impl StrategyInit {
    /// The name of the implementation contract
    pub fn contract(&self) -> &'static str {
        match self {
            StrategyInit::AaveV3(_) => "AaveV3",
            StrategyInit::AaveV3VesperBorrow(_) => "AaveV3VesperBorrow",
            StrategyInit::AaveV3VesperBorrowForStETH(_) => "AaveV3VesperBorrowForStETH",
            StrategyInit::AaveV3SommelierBorrow(_) => "AaveV3SommelierBorrow",
            StrategyInit::AaveV3SommelierBorrowForStETH(_) => "AaveV3SommelierBorrowForStETH",
            StrategyInit::CompoundV3(_) => "CompoundV3",
            StrategyInit::CompoundV3Borrow(_) => "CompoundV3Borrow",
            StrategyInit::CompoundV3VesperBorrow(_) => "CompoundV3VesperBorrow",
            StrategyInit::Curve(_) => "Curve",
            StrategyInit::Convex(_) => "Convex",
            StrategyInit::EulerV2(_) => "EulerV2",
            StrategyInit::ExtraFinance(_) => "ExtraFinance",
            StrategyInit::FraxlendV1(_) => "FraxlendV1",
            StrategyInit::FraxlendV1VesperBorrow(_) => "FraxlendV1VesperBorrow",
            StrategyInit::MorphoVault(_) => "MorphoVault",
            StrategyInit::Sommelier(_) => "Sommelier",
            StrategyInit::StargateV2(_) => "StargateV2",
            StrategyInit::Yearn(_) => "Yearn",
        }
    }

    /// The initializer call the proxy is constructed with
    pub fn initializer(&self) -> Initializer {
        use InitArg::{Address as A, String as S};

        match self {
            StrategyInit::AaveV3(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.receipt_token),
                A(init.pool_addresses_provider),
                S(init.name.clone()),
            ]),
            StrategyInit::AaveV3VesperBorrow(init) | StrategyInit::AaveV3SommelierBorrow(init) => {
                Initializer::new(vec![
                    A(init.pool),
                    A(init.swapper),
                    A(init.receipt_token),
                    A(init.borrow_token),
                    A(init.pool_addresses_provider),
                    A(init.borrow_destination),
                    S(init.name.clone()),
                ])
            }
            StrategyInit::AaveV3VesperBorrowForStETH(init) => {
                Initializer::new(aave_v3_steth_args(init))
            }
            StrategyInit::AaveV3SommelierBorrowForStETH(init) => Initializer::with_method(
                "AaveV3SommelierBorrowForStETH_initialize",
                aave_v3_steth_args(init),
            ),
            StrategyInit::CompoundV3(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.rewards),
                A(init.reward_token),
                A(init.comet),
                S(init.name.clone()),
            ]),
            StrategyInit::CompoundV3Borrow(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.rewards),
                A(init.reward_token),
                A(init.comet),
                A(init.borrow_token),
                S(init.name.clone()),
            ]),
            StrategyInit::CompoundV3VesperBorrow(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.rewards),
                A(init.reward_token),
                A(init.comet),
                A(init.borrow_token),
                A(init.vesper_pool),
                S(init.name.clone()),
            ]),
            StrategyInit::Curve(params) => Initializer::new(vec![params.to_arg()]),
            StrategyInit::Convex(init) => {
                let mut args = vec![init.params.to_arg(), A(init.booster)];
                if let Some(cvx) = init.cvx {
                    args.push(A(cvx));
                }
                args.push(InitArg::uint(init.convex_pool_id));
                Initializer::new(args)
            }
            StrategyInit::ExtraFinance(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.lending_pool),
                InitArg::uint(init.reserve_id),
                S(init.name.clone()),
            ]),
            StrategyInit::FraxlendV1VesperBorrow(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.fraxlend_pair),
                A(init.borrow_token),
                A(init.vesper_pool),
                S(init.name.clone()),
            ]),
            StrategyInit::StargateV2(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.stargate_pool),
                A(init.stargate_staking),
                S(init.name.clone()),
            ]),
            StrategyInit::EulerV2(init)
            | StrategyInit::FraxlendV1(init)
            | StrategyInit::MorphoVault(init)
            | StrategyInit::Sommelier(init)
            | StrategyInit::Yearn(init) => Initializer::new(vec![
                A(init.pool),
                A(init.swapper),
                A(init.receipt_token),
                S(init.name.clone()),
            ]),
        }
    }
}

/// Initializer arguments of the stETH borrow strategy
fn aave_v3_steth_args(init: &AaveV3BorrowForStEthInit) -> Vec<InitArg> {
    vec![
        InitArg::Address(init.pool),
        InitArg::Address(init.swapper),
        InitArg::Address(init.receipt_token),
        InitArg::Address(init.borrow_token),
        InitArg::Address(init.pool_addresses_provider),
        InitArg::Address(init.borrow_destination),
        InitArg::Address(init.wst_eth),
        InitArg::String(init.name.clone()),
    ]
}

/// Load a declarations file, rejecting duplicate aliases
pub fn load_declarations(path: &Path) -> Result<Vec<StrategyDeclaration>, ScriptError> {
    let declarations: Vec<StrategyDeclaration> = read_json_file(path)?;

    let mut seen = HashSet::new();
    for declaration in &declarations {
        if !seen.insert(declaration.alias.as_str()) {
            return Err(ScriptError::InvalidParameter(format!(
                "duplicate alias {} in {}",
                declaration.alias,
                path.display()
            )));
        }
    }

    Ok(declarations)
}

// -----------------
// | Configuration |
// -----------------

/// Deploy or upgrade a strategy, then bring its on-chain configuration up to date
pub async fn deploy_and_configure_strategy(
    ctx: &DeployContext,
    declaration: &StrategyDeclaration,
) -> Result<DeployResult, ScriptError> {
    let deployer = ctx.deployer()?;
    let params = DeployParams {
        alias: declaration.alias.clone(),
        contract: declaration.init.contract().to_string(),
        initializer: declaration.init.initializer(),
    };

    let deployed = deploy_or_upgrade(ctx, &params).await?;
    let strategy = deployed.deployment.address;
    let chain = ctx.chain.as_ref();

    // The collateral allowance to the pool is the key approval of a strategy
    let pool = read(chain, strategy, IStrategy::poolCall {}).await?._0;
    let collateral = read(chain, strategy, IStrategy::collateralTokenCall {}).await?._0;
    let allowance_call = IERC20::allowanceCall { owner: strategy, spender: pool };
    let allowance = read(chain, collateral, allowance_call).await?._0;
    if allowance.is_zero() {
        let approve = IStrategy::approveTokenCall { approvalAmount: U256::MAX };
        let tx_hash = ctx
            .chain
            .send(deployer, strategy, approve.abi_encode().into())
            .await
            .map_err(|e| ScriptError::ContractInteraction(format!("approveToken: {}", e)))?;
        info!(alias = %declaration.alias, tx_hash = %tx_hash, "approved collateral to pool");
    }

    let governor = read(chain, strategy, IStrategy::governorCall {}).await?._0;
    let keeper = match declaration.config.keeper {
        Some(keeper) => keeper,
        None => parse_address(DEFAULT_KEEPER)?,
    };
    let keepers = read(chain, strategy, IStrategy::keepersCall {}).await?._0;
    if !keepers.contains(&keeper) {
        let add_keeper = IStrategy::addKeeperCall { keeperAddress: keeper };
        execute_as_governor(ctx, strategy, add_keeper, governor).await?;
    }

    add_strategy(ctx, deployer, governor, strategy, &declaration.config).await?;

    let artifact = ctx.artifacts.load(&params.contract)?;
    verify_contract(ctx, deployed.implementation, &artifact, &[]).await;

    Ok(deployed)
}

/// Register the strategy with its pool accountant unless it is already active
async fn add_strategy(
    ctx: &DeployContext,
    deployer: Address,
    governor: Address,
    strategy: Address,
    config: &ConfigParams,
) -> Result<(), ScriptError> {
    let chain = ctx.chain.as_ref();
    if read(chain, strategy, IStrategy::isActiveCall {}).await?._0 {
        return Ok(());
    }

    let accountant = read(chain, strategy, IStrategy::poolAccountantCall {}).await?._0;
    let add = IPoolAccountant::addStrategyCall {
        strategy,
        debtRatio: U256::from(config.debt_ratio.unwrap_or(DEFAULT_DEBT_RATIO)),
        externalDepositFee: U256::from(
            config
                .external_deposit_fee
                .unwrap_or(DEFAULT_EXTERNAL_DEPOSIT_FEE),
        ),
    };

    if deployer == governor {
        info!(strategy = %strategy, "deployer is governor, adding strategy directly");
        let tx_hash = ctx
            .chain
            .send(deployer, accountant, add.abi_encode().into())
            .await
            .map_err(|e| ScriptError::ContractInteraction(format!("addStrategy: {}", e)))?;
        info!(strategy = %strategy, tx_hash = %tx_hash, "added strategy to pool accountant");
        return Ok(());
    }

    queue_for_multisig(ctx, &PrivilegedCall::new(governor, accountant, add))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use alloy_primitives::{address, Address, U256};
    use alloy_sol_types::SolCall;

    use crate::{
        errors::ScriptError,
        initializer::InitArg,
        solidity::IPoolAccountant,
        test_helpers::{test_context, MockChain, ACCOUNTANT, COLLATERAL, POOL},
    };

    use super::{deploy_and_configure_strategy, StrategyDeclaration, StrategyInit};

    const DEPLOYER: Address = address!("00000000000000000000000000000000000000d1");
    const GOVERNOR: Address = address!("00000000000000000000000000000000000000a1");
    const KEEPER: Address = address!("00000000000000000000000000000000000000c1");

    fn yearn_declaration() -> StrategyDeclaration {
        StrategyDeclaration::from_str(&format!(
            r#"{{
                "alias": "Yearn_ETH",
                "contract": "Yearn",
                "initialize": {{
                    "pool": "{POOL}",
                    "swapper": "0x00000000000000000000000000000000000000b2",
                    "receiptToken": "0x00000000000000000000000000000000000000b3",
                    "name": "Yearn_ETH"
                }},
                "config": {{ "keeper": "{KEEPER}", "debtRatio": 9000 }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_parse_struct_initializer() {
        let declaration = StrategyDeclaration::from_str(
            r#"{
                "alias": "Convex_eUSD_USDC",
                "contract": "Convex",
                "initialize": {
                    "params": {
                        "pool": "0x00000000000000000000000000000000000000b1",
                        "swapper": "0x00000000000000000000000000000000000000b2",
                        "curvePool": "0x00000000000000000000000000000000000000b3",
                        "curveToken": "0x00000000000000000000000000000000000000b4",
                        "depositAndStake": "0x00000000000000000000000000000000000000b5",
                        "useDynamicArray": true,
                        "slippage": 50,
                        "weth": "0x00000000000000000000000000000000000000b6",
                        "masterOracle": "0x00000000000000000000000000000000000000b7",
                        "name": "Convex_eUSD_USDC"
                    },
                    "booster": "0x00000000000000000000000000000000000000b8",
                    "cvx": "0x00000000000000000000000000000000000000b9",
                    "convexPoolId": 369
                }
            }"#,
        )
        .unwrap();

        assert_eq!(declaration.init.contract(), "Convex");
        assert_eq!(declaration.config.keeper, None);

        let initializer = declaration.init.initializer();
        assert_eq!(initializer.method, "initialize");
        assert_eq!(initializer.args.len(), 4);
        assert_eq!(initializer.args[3], InitArg::Uint(U256::from(369)));
        let InitArg::Struct(fields) = &initializer.args[0] else {
            panic!("expected a struct argument");
        };
        assert!(fields.iter().any(|(name, _)| name == "curveToken"));
        assert!(fields.iter().any(|(name, arg)| {
            name == "curvePoolZap" && *arg == InitArg::Address(Address::ZERO)
        }));
    }

    #[test]
    fn test_custom_initializer_method() {
        let declaration = StrategyDeclaration::from_str(
            r#"{
                "alias": "AaveV3_Sommelier_Borrow_stETH_WETH",
                "contract": "AaveV3SommelierBorrowForStETH",
                "initialize": {
                    "pool": "0x00000000000000000000000000000000000000b1",
                    "swapper": "0x00000000000000000000000000000000000000b2",
                    "receiptToken": "0x00000000000000000000000000000000000000b3",
                    "borrowToken": "0x00000000000000000000000000000000000000b4",
                    "poolAddressesProvider": "0x00000000000000000000000000000000000000b5",
                    "borrowDestination": "0x00000000000000000000000000000000000000b6",
                    "wstETH": "0x00000000000000000000000000000000000000b7",
                    "name": "AaveV3_Sommelier_Borrow_stETH_WETH"
                }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            declaration.init,
            StrategyInit::AaveV3SommelierBorrowForStETH(_)
        ));
        let initializer = declaration.init.initializer();
        assert_eq!(initializer.method, "AaveV3SommelierBorrowForStETH_initialize");
        assert_eq!(initializer.args.len(), 8);
    }

    #[test]
    fn test_unknown_contract_is_rejected() {
        let result = StrategyDeclaration::from_str(
            r#"{ "alias": "Mystery", "contract": "Mystery", "initialize": {} }"#,
        );
        assert!(matches!(result, Err(ScriptError::Serde(_))));
    }

    #[tokio::test]
    async fn test_configuration_is_queued_for_foreign_governor() -> eyre::Result<()> {
        let chain = MockChain::new(&[DEPLOYER]);
        chain.set_default_governor(GOVERNOR);
        let (ctx, _dir) = test_context(chain.clone(), "hardhat", Some(DEPLOYER));
        let declaration = yearn_declaration();

        let deployed = deploy_and_configure_strategy(&ctx, &declaration).await?;
        let strategy = deployed.deployment.address;

        // Only the approval could be executed, from the deployer
        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, DEPLOYER);
        assert_eq!(sent[0].to, strategy);
        assert_eq!(chain.allowance(strategy), U256::MAX);

        let queued = ctx.safe_batch.load()?;
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|tx| tx.from == GOVERNOR));
        assert_eq!(queued[0].to, strategy);
        assert_eq!(queued[1].to, ACCOUNTANT);
        let expected = IPoolAccountant::addStrategyCall {
            strategy,
            debtRatio: U256::from(9000),
            externalDepositFee: U256::ZERO,
        };
        assert_eq!(queued[1].data.as_ref(), expected.abi_encode().as_slice());

        // A rerun neither approves again nor queues duplicates
        deploy_and_configure_strategy(&ctx, &declaration).await?;
        assert_eq!(chain.sent().len(), 1);
        assert_eq!(ctx.safe_batch.load()?.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_configuration_executes_when_deployer_governs() -> eyre::Result<()> {
        let chain = MockChain::new(&[DEPLOYER]);
        chain.set_default_governor(DEPLOYER);
        let (ctx, _dir) = test_context(chain.clone(), "hardhat", Some(DEPLOYER));
        let declaration = yearn_declaration();

        let deployed = deploy_and_configure_strategy(&ctx, &declaration).await?;
        let strategy = deployed.deployment.address;

        // approveToken, addKeeper and addStrategy
        assert_eq!(chain.sent().len(), 3);
        assert!(ctx.safe_batch.load()?.is_empty());
        assert_eq!(chain.keepers(strategy), vec![KEEPER]);
        assert!(chain.is_active(strategy));

        deploy_and_configure_strategy(&ctx, &declaration).await?;
        assert_eq!(chain.sent().len(), 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_existing_allowance_skips_approval() -> eyre::Result<()> {
        let chain = MockChain::new(&[DEPLOYER]);
        chain.set_default_governor(GOVERNOR);
        chain.set_default_allowance(U256::from(1));
        let (ctx, _dir) = test_context(chain.clone(), "hardhat", Some(DEPLOYER));

        deploy_and_configure_strategy(&ctx, &yearn_declaration()).await?;
        assert!(chain.sent().is_empty());
        assert_eq!(chain.allowance_queries(), vec![(COLLATERAL, POOL)]);

        Ok(())
    }
}
