use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use posd_coinview::{CoinView, Coins, FetchCoinsResponse, HashHeightPair, UnspentOutput};
use posd_consensus::params::{consensus_params, Network};
use posd_consensus::{ConsensusError, ConsensusParams, Hash256};
use posd_primitives::block::{Block, BlockHeader, BlockSignature};
use posd_primitives::hash::sha256d;
use posd_primitives::outpoint::OutPoint;
use posd_primitives::proven::ProvenBlockHeader;
use posd_primitives::script::p2pk_script;
use posd_primitives::transaction::{Transaction, TxIn, TxOut};
use posd_stake::validator::{ScriptFlags, SCRIPT_VERIFY_NONE};
use posd_stake::{
    BlockStake, ChainedHeader, ProvenHeaderCheck, ProvenHeaderCoinstakeRule, RuleError, RuleFault,
    StakeChain, StakeValidator,
};
use posd_storage::StoreError;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

const STAKE_TIME: u32 = 1_700_000_000;
const STAKED: OutPoint = OutPoint {
    hash: [0x44; 32],
    index: 0,
};

#[derive(Default)]
struct MapCoinView {
    coins: HashMap<OutPoint, UnspentOutput>,
}

impl CoinView for MapCoinView {
    fn fetch_coins(&self, outpoints: &HashSet<OutPoint>) -> Result<FetchCoinsResponse, StoreError> {
        Ok(outpoints
            .iter()
            .map(|outpoint| (*outpoint, self.coins.get(outpoint).cloned()))
            .collect())
    }

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, StoreError> {
        Ok(None)
    }
}

#[derive(Default)]
struct MapStakeChain {
    stakes: HashMap<Hash256, BlockStake>,
}

impl StakeChain for MapStakeChain {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StoreError> {
        Ok(self.stakes.get(block_hash).cloned())
    }
}

struct MockValidator {
    confirmed_recently: bool,
    signature_ok: bool,
    kernel: Result<(), ConsensusError>,
    depth_asked: Mutex<Option<u32>>,
    kernel_modifier: Mutex<Option<Hash256>>,
}

impl Default for MockValidator {
    fn default() -> Self {
        Self {
            confirmed_recently: false,
            signature_ok: true,
            kernel: Ok(()),
            depth_asked: Mutex::new(None),
            kernel_modifier: Mutex::new(None),
        }
    }
}

impl StakeValidator for MockValidator {
    fn verify_signature(
        &self,
        _: &UnspentOutput,
        _: &Transaction,
        input_index: usize,
        flags: ScriptFlags,
    ) -> bool {
        // The coinstake's staking input is checked with no extra script flags.
        self.signature_ok && input_index == 0 && flags == SCRIPT_VERIFY_NONE
    }

    fn check_stake_kernel_hash(
        &self,
        _: u32,
        prev_stake_modifier: &Hash256,
        _: &UnspentOutput,
        prevout: &OutPoint,
        transaction_time: u32,
    ) -> Result<(), ConsensusError> {
        assert_eq!(*prevout, STAKED);
        assert_eq!(transaction_time, STAKE_TIME);
        *self.kernel_modifier.lock().expect("lock") = Some(*prev_stake_modifier);
        self.kernel
    }

    fn is_confirmed_in_n_prev_blocks(
        &self,
        _: &UnspentOutput,
        _: &ChainedHeader,
        max_depth: u32,
    ) -> bool {
        *self.depth_asked.lock().expect("lock") = Some(max_depth);
        self.confirmed_recently
    }

    fn get_next_target_required(
        &self,
        _: &dyn StakeChain,
        previous: &ChainedHeader,
        _: &ConsensusParams,
        _: bool,
    ) -> u32 {
        previous.block_header().bits
    }

    fn compute_stake_modifier_v2(
        &self,
        _: &ChainedHeader,
        prev_stake_modifier: &Hash256,
        kernel: &Hash256,
    ) -> Hash256 {
        let mut data = prev_stake_modifier.to_vec();
        data.extend_from_slice(kernel);
        sha256d(&data)
    }
}

fn make_test_secret_key(last_byte: u8) -> SecretKey {
    let mut bytes = [0u8; 32];
    bytes[31] = last_byte;
    SecretKey::from_slice(&bytes).expect("secret key")
}

fn params() -> ConsensusParams {
    consensus_params(Network::Mainnet)
}

fn above_activation() -> u32 {
    params().proven_headers_activation_height + 10
}

fn staked_coin(height: u32) -> UnspentOutput {
    UnspentOutput::new(
        STAKED,
        Coins::new(height, TxOut::new(5_000, vec![0x51]), false, true, STAKE_TIME - 4_096),
    )
}

/// A signed proof-of-stake block staking [`STAKED`], in proven form.
fn proven_header(signer: u8) -> ProvenBlockHeader {
    let secp = Secp256k1::signing_only();
    let staker = make_test_secret_key(3);
    let pubkey = PublicKey::from_secret_key(&secp, &staker);

    let coinbase = Transaction {
        version: 1,
        time: STAKE_TIME,
        vin: vec![TxIn::new(OutPoint::null())],
        vout: vec![TxOut::default()],
        lock_time: 0,
    };
    let coinstake = Transaction {
        version: 1,
        time: STAKE_TIME,
        vin: vec![TxIn::new(STAKED)],
        vout: vec![TxOut::default(), TxOut::new(5_100, p2pk_script(&pubkey.serialize()))],
        lock_time: 0,
    };
    let payment = Transaction {
        version: 1,
        time: STAKE_TIME,
        vin: vec![TxIn::new(OutPoint::new([0x55; 32], 2))],
        vout: vec![TxOut::new(10, vec![0x51])],
        lock_time: 0,
    };
    let mut block = Block {
        header: BlockHeader {
            version: 7,
            prev_block: [0x66; 32],
            merkle_root: [0; 32],
            time: STAKE_TIME,
            bits: 0x1e0f_ffff,
            nonce: 0,
        },
        transactions: vec![coinbase, coinstake, payment],
        signature: BlockSignature::empty(),
    };
    block.header.merkle_root = block.compute_merkle_root().0;
    let msg = Message::from_digest_slice(&block.hash()).expect("msg");
    let sig = secp.sign_ecdsa(&msg, &make_test_secret_key(signer));
    block.signature = BlockSignature(sig.serialize_der().to_vec());

    ProvenBlockHeader::from_block(&block).expect("proof-of-stake block")
}

fn previous_proven(height: u32, modifier: Option<Hash256>) -> Arc<ChainedHeader> {
    let mut previous = proven_header(3);
    previous.header.nonce = 1;
    previous.stake_modifier_v2 = modifier;
    Arc::new(ChainedHeader::proven(previous, height, None))
}

struct Scenario {
    params: ConsensusParams,
    coin_view: MapCoinView,
    stake_chain: MapStakeChain,
    validator: Arc<MockValidator>,
}

impl Scenario {
    fn new() -> Self {
        let mut coin_view = MapCoinView::default();
        coin_view
            .coins
            .insert(STAKED, staked_coin(above_activation() - 500));
        Self {
            params: params(),
            coin_view,
            stake_chain: MapStakeChain::default(),
            validator: Arc::new(MockValidator::default()),
        }
    }

    fn with_validator(mut self, validator: MockValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    fn run(self, chained: Option<&ChainedHeader>) -> Result<ProvenHeaderCheck, RuleError> {
        ProvenHeaderCoinstakeRule::new(
            self.params,
            Arc::new(self.coin_view),
            Arc::new(self.stake_chain),
            self.validator,
        )
        .run(chained)
    }
}

fn chained(header: ProvenBlockHeader, height: u32) -> ChainedHeader {
    let previous = previous_proven(height - 1, Some([0x99; 32]));
    ChainedHeader::proven(header, height, Some(previous))
}

fn consensus_error(result: Result<ProvenHeaderCheck, RuleError>) -> ConsensusError {
    match result {
        Err(RuleError::Consensus(err)) => err,
        other => panic!("expected a consensus error, got {other:?}"),
    }
}

#[test]
fn rule_is_skipped_below_activation() {
    let mut header = proven_header(3);
    header.coinstake = None;
    let height = params().proven_headers_activation_height - 1;
    let chained = ChainedHeader::proven(header, height, None);

    let mut scenario = Scenario::new();
    scenario.coin_view.coins.clear();
    assert_eq!(scenario.run(Some(&chained)).expect("skipped"), ProvenHeaderCheck::Skipped);
}

#[test]
fn missing_chained_header_is_a_fault() {
    let err = Scenario::new().run(None).expect_err("no header");
    assert!(matches!(err, RuleError::Fault(RuleFault::MissingChainedHeader)));
}

#[test]
fn plain_header_above_activation_is_a_fault() {
    let header = proven_header(3).header;
    let chained = ChainedHeader::plain(header, above_activation(), None);
    let err = Scenario::new().run(Some(&chained)).expect_err("plain header");
    assert!(matches!(err, RuleError::Fault(RuleFault::NotProvenHeader)));
    assert!(err.is_fault());
}

#[test]
fn null_coinstake_is_rejected() {
    let mut header = proven_header(3);
    header.coinstake = None;
    let chained = chained(header, above_activation());
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&chained))),
        ConsensusError::EmptyCoinstake
    );
}

#[test]
fn unknown_staked_coin_is_rejected() {
    let chained = chained(proven_header(3), above_activation());
    let mut scenario = Scenario::new();
    scenario.coin_view.coins.clear();
    assert_eq!(
        consensus_error(scenario.run(Some(&chained))),
        ConsensusError::ReadTxPrevFailedInsufficient
    );
}

#[test]
fn spent_staked_coin_is_rejected() {
    let chained = chained(proven_header(3), above_activation());
    let mut scenario = Scenario::new();
    let mut spent = staked_coin(1);
    assert!(spent.spend());
    scenario.coin_view.coins.insert(STAKED, spent);
    assert_eq!(
        consensus_error(scenario.run(Some(&chained))),
        ConsensusError::ReadTxPrevFailedInsufficient
    );
}

#[test]
fn non_coinstake_past_last_pow_block_is_rejected() {
    let mut header = proven_header(3);
    if let Some(coinstake) = header.coinstake.as_mut() {
        coinstake.vout.remove(0);
    }
    let height = above_activation() + params().last_pow_block;
    let chained = chained(header, height);
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&chained))),
        ConsensusError::ProofOfWorkTooHigh
    );
}

#[test]
fn non_coinstake_within_pow_period_ends_the_check() {
    let mut header = proven_header(3);
    if let Some(coinstake) = header.coinstake.as_mut() {
        coinstake.vout.remove(0);
    }
    let mut scenario = Scenario::new();
    scenario.params.proven_headers_activation_height = 100;
    scenario.params.last_pow_block = 200;
    let chained = chained(header, 150);
    assert_eq!(
        scenario.run(Some(&chained)).expect("proof of work"),
        ProvenHeaderCheck::ProofOfWork
    );
}

#[test]
fn mismatched_or_unmasked_stake_time_is_rejected() {
    let mut header = proven_header(3);
    header.header.time = 16;
    let mismatched = chained(header, above_activation());
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&mismatched))),
        ConsensusError::StakeTimeViolation
    );

    let mut header = proven_header(3);
    header.header.time = 50;
    if let Some(coinstake) = header.coinstake.as_mut() {
        coinstake.time = 50;
    }
    let unmasked = chained(header, above_activation());
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&unmasked))),
        ConsensusError::StakeTimeViolation
    );
}

#[test]
fn missing_previous_header_is_a_fault() {
    let chained = ChainedHeader::proven(proven_header(3), above_activation(), None);
    let err = Scenario::new().run(Some(&chained)).expect_err("no previous");
    assert!(matches!(err, RuleError::Fault(RuleFault::MissingPreviousHeader)));
}

#[test]
fn recently_confirmed_stake_is_rejected() {
    let validator = Arc::new(MockValidator {
        confirmed_recently: true,
        ..MockValidator::default()
    });
    let chained = chained(proven_header(3), above_activation());
    let mut scenario = Scenario::new();
    scenario.validator = Arc::clone(&validator);
    assert_eq!(
        consensus_error(scenario.run(Some(&chained))),
        ConsensusError::InvalidStakeDepth
    );
    assert_eq!(
        *validator.depth_asked.lock().expect("lock"),
        Some(params().stake_min_confirmations - 1)
    );
}

#[test]
fn bad_coinstake_signature_is_rejected() {
    let chained = chained(proven_header(3), above_activation());
    let scenario = Scenario::new().with_validator(MockValidator {
        signature_ok: false,
        ..MockValidator::default()
    });
    assert_eq!(
        consensus_error(scenario.run(Some(&chained))),
        ConsensusError::CoinstakeVerifySignatureFailed
    );
}

#[test]
fn previous_header_without_modifier_is_rejected() {
    let height = above_activation();
    let previous = previous_proven(height - 1, None);
    let chained = ChainedHeader::proven(proven_header(3), height, Some(previous));
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&chained))),
        ConsensusError::InvalidPreviousProvenHeaderStakeModifier
    );
}

#[test]
fn kernel_failure_is_propagated() {
    let chained = chained(proven_header(3), above_activation());
    let scenario = Scenario::new().with_validator(MockValidator {
        kernel: Err(ConsensusError::StakeHashInvalidTarget),
        ..MockValidator::default()
    });
    assert_eq!(
        consensus_error(scenario.run(Some(&chained))),
        ConsensusError::StakeHashInvalidTarget
    );
}

#[test]
fn broken_merkle_proof_is_rejected() {
    let mut header = proven_header(3);
    header.header.merkle_root = [0x77; 32];
    let chained = chained(header, above_activation());
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&chained))),
        ConsensusError::BadMerkleRoot
    );
}

#[test]
fn block_signature_from_wrong_key_is_rejected() {
    let chained = chained(proven_header(4), above_activation());
    assert_eq!(
        consensus_error(Scenario::new().run(Some(&chained))),
        ConsensusError::BadBlockSignature
    );
}

#[test]
fn valid_header_yields_the_next_stake_modifier() {
    let validator = Arc::new(MockValidator::default());
    let chained = chained(proven_header(3), above_activation());
    let mut scenario = Scenario::new();
    scenario.validator = Arc::clone(&validator);

    let outcome = scenario.run(Some(&chained)).expect("valid header");
    let mut expected = [0x99u8; 32].to_vec();
    expected.extend_from_slice(&STAKED.hash);
    assert_eq!(
        outcome,
        ProvenHeaderCheck::Validated {
            stake_modifier_v2: sha256d(&expected)
        }
    );
    assert_eq!(*validator.kernel_modifier.lock().expect("lock"), Some([0x99; 32]));
    assert!(chained.proven_header().is_some_and(|h| h.stake_modifier_v2.is_none()));
}

#[test]
fn plain_previous_header_takes_modifier_from_stake_chain() {
    let height = above_activation();
    let previous_header = proven_header(3).header;
    let previous = Arc::new(ChainedHeader::plain(previous_header, height - 1, None));
    let chained = ChainedHeader::proven(proven_header(3), height, Some(Arc::clone(&previous)));

    let missing = Scenario::new();
    assert_eq!(
        consensus_error(missing.run(Some(&chained))),
        ConsensusError::InvalidPreviousProvenHeaderStakeModifier
    );

    let mut scenario = Scenario::new();
    scenario.stake_chain.stakes.insert(
        previous.hash,
        BlockStake {
            stake_modifier_v2: Some([0x99; 32]),
            ..BlockStake::default()
        },
    );
    assert!(matches!(
        scenario.run(Some(&chained)),
        Ok(ProvenHeaderCheck::Validated { .. })
    ));
}

#[test]
fn rejection_is_logged_with_its_code() {
    posd_log::enable_capture(128);
    let mut header = proven_header(3);
    header.coinstake = None;
    let chained = chained(header, above_activation());
    let _ = Scenario::new().run(Some(&chained));

    let code = ConsensusError::EmptyCoinstake.code();
    assert!(posd_log::capture_snapshot(128)
        .iter()
        .any(|record| record.msg.contains(code)));
}
