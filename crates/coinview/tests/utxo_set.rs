use std::collections::HashSet;
use std::sync::Arc;

use posd_coinview::{
    CoinViewFault, Coins, CoinviewHelper, Fanout, FanoutConfig, UnspentOutput, UnspentOutputSet,
};
use posd_consensus::params::{consensus_params, Network};
use posd_primitives::block::{Block, BlockHeader, BlockSignature};
use posd_primitives::outpoint::OutPoint;
use posd_primitives::script::op_return_script;
use posd_primitives::transaction::{Transaction, TxIn, TxOut};

fn sequential() -> Arc<Fanout> {
    Arc::new(Fanout::new(FanoutConfig::sequential()))
}

fn eager() -> Arc<Fanout> {
    Arc::new(Fanout::new(FanoutConfig {
        threshold: 0,
        max_workers: 4,
    }))
}

fn coin(outpoint: OutPoint, value: i64) -> UnspentOutput {
    UnspentOutput::new(
        outpoint,
        Coins::new(1, TxOut::new(value, vec![0x51]), false, false, 0),
    )
}

fn tx(inputs: Vec<OutPoint>, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: 1,
        time: 1_700_000_000,
        vin: inputs.into_iter().map(TxIn::new).collect(),
        vout: outputs,
        lock_time: 0,
    }
}

fn block(transactions: Vec<Transaction>) -> Block {
    Block {
        header: BlockHeader {
            version: 7,
            prev_block: [3; 32],
            merkle_root: [0; 32],
            time: 1_700_000_000,
            bits: 0x1e0f_ffff,
            nonce: 0,
        },
        transactions,
        signature: BlockSignature::empty(),
    }
}

#[test]
fn update_is_order_dependent() {
    let params = consensus_params(Network::Regtest);
    let funding = OutPoint::new([1; 32], 0);
    let t1 = tx(vec![funding], vec![TxOut::new(8, vec![0x51])]);
    let t2 = tx(vec![OutPoint::new(t1.txid(), 0)], vec![TxOut::new(7, vec![0x51])]);

    let mut out_of_order = UnspentOutputSet::new(sequential());
    out_of_order.set_coins([Some(coin(funding, 10))]);
    let err = out_of_order
        .update(&params, &t2, 5)
        .expect_err("parent not applied yet");
    assert!(matches!(err, CoinViewFault::MissingCoin(_)));

    let mut in_order = UnspentOutputSet::new(sequential());
    in_order.set_coins([Some(coin(funding, 10))]);
    assert!(!in_order.have_inputs(&t2));
    in_order.update(&params, &t1, 5).expect("t1");
    assert!(in_order.have_inputs(&t2));
    in_order.update(&params, &t2, 5).expect("t2");
    assert!(in_order.is_unspent(&OutPoint::new(t2.txid(), 0)));
}

#[test]
fn prunable_outputs_never_enter_the_set() {
    let params = consensus_params(Network::Regtest);
    let funding = OutPoint::new([1; 32], 0);
    let mut set = UnspentOutputSet::new(sequential());
    set.set_coins([Some(coin(funding, 10))]);

    let carrier = tx(
        vec![funding],
        vec![TxOut::new(0, op_return_script(b"memo")), TxOut::new(9, vec![0x51])],
    );
    set.update(&params, &carrier, 2).expect("update");
    assert!(set.access_coins(&OutPoint::new(carrier.txid(), 0)).is_none());
    assert!(set.access_coins(&OutPoint::new(carrier.txid(), 1)).is_some());
}

#[test]
fn set_coins_and_try_set_coins_resolve_duplicates_oppositely() {
    let key = OutPoint::new([5; 32], 2);
    let first = coin(key, 100);
    let second = coin(key, 200);
    let value = |set: &UnspentOutputSet| {
        set.access_coins(&key)
            .and_then(|entry| entry.coins().map(|coins| coins.tx_out.value))
    };

    let mut set = UnspentOutputSet::new(sequential());
    set.set_coins([Some(first.clone())]);
    set.set_coins([Some(second.clone())]);
    assert_eq!(value(&set), Some(200));

    set.set_coins([Some(first.clone()), None, Some(second.clone())]);
    assert_eq!(value(&set), Some(200));
    assert_eq!(set.len(), 1);

    set.try_set_coins([Some(first), None, Some(second)]);
    assert_eq!(value(&set), Some(100));
    assert_eq!(set.len(), 1);
}

#[test]
fn have_inputs_needs_every_input_unspent() {
    let params = consensus_params(Network::Regtest);
    let a = OutPoint::new([1; 32], 0);
    let b = OutPoint::new([2; 32], 0);
    let mut set = UnspentOutputSet::new(sequential());
    set.set_coins([Some(coin(a, 1)), Some(coin(b, 1))]);

    let both = tx(vec![a, b], vec![]);
    let with_missing = tx(vec![a, OutPoint::new([9; 32], 0)], vec![]);
    assert!(set.have_inputs(&both));
    assert!(!set.have_inputs(&with_missing));

    set.update(&params, &tx(vec![b], vec![]), 3).expect("spend b");
    assert!(!set.have_inputs(&both));
}

#[test]
fn double_spend_is_a_fault() {
    let params = consensus_params(Network::Regtest);
    let a = OutPoint::new([1; 32], 0);
    let mut set = UnspentOutputSet::new(sequential());
    set.set_coins([Some(coin(a, 1))]);

    set.update(&params, &tx(vec![a], vec![]), 3).expect("first spend");
    let err = set
        .update(&params, &tx(vec![a], vec![TxOut::new(1, vec![0x51])]), 3)
        .expect_err("second spend");
    assert!(matches!(err, CoinViewFault::DoubleSpend(outpoint) if outpoint == a));
}

#[test]
fn parallel_update_matches_sequential() {
    let params = consensus_params(Network::Mainnet);
    let inputs: Vec<OutPoint> = (0..600u32).map(|i| OutPoint::new([7; 32], i)).collect();
    let outputs: Vec<TxOut> = (0..600).map(|i| TxOut::new(i + 1, vec![0x51])).collect();
    let wide = tx(inputs.clone(), outputs);

    let run = |fanout: Arc<Fanout>| {
        let mut set = UnspentOutputSet::new(fanout);
        set.set_coins(inputs.iter().map(|outpoint| Some(coin(*outpoint, 10))));
        set.update(&params, &wide, 9).expect("update");
        let mut coins = set.get_coins();
        coins.sort_by_key(|entry| entry.outpoint);
        coins
    };
    assert_eq!(run(sequential()), run(eager()));
}

#[test]
fn parallel_faults_report_the_lowest_input() {
    let params = consensus_params(Network::Regtest);
    let inputs: Vec<OutPoint> = (0..400u32).map(|i| OutPoint::new([7; 32], i)).collect();
    let mut set = UnspentOutputSet::new(eager());
    set.set_coins(
        inputs
            .iter()
            .filter(|outpoint| outpoint.index != 17 && outpoint.index != 300)
            .map(|outpoint| Some(coin(*outpoint, 1))),
    );
    let err = set
        .update(&params, &tx(inputs, vec![]), 1)
        .expect_err("missing coins");
    assert!(matches!(err, CoinViewFault::MissingCoin(outpoint) if outpoint.index == 17));
}

#[test]
fn parallel_prefetch_matches_sequential() {
    let coinbase = tx(vec![OutPoint::null()], vec![TxOut::new(50, vec![0x51])]);
    let mut transactions = vec![coinbase];
    let mut previous = None;
    for n in 0..300u32 {
        let mut inputs = vec![OutPoint::new([(n % 250) as u8; 32], n)];
        if let Some(txid) = previous {
            inputs.push(OutPoint::new(txid, 0));
        }
        let next = tx(inputs, vec![TxOut::new(1, vec![0x51]); 2]);
        previous = Some(next.txid());
        transactions.push(next);
    }
    let block = block(transactions);

    for bip30 in [false, true] {
        let inline = CoinviewHelper::new(sequential()).get_ids_to_fetch(&block, bip30);
        let parallel = CoinviewHelper::new(eager()).get_ids_to_fetch(&block, bip30);
        assert_eq!(inline, parallel);
    }

    let ids = CoinviewHelper::new(eager()).get_ids_to_fetch(&block, false);
    let created: HashSet<_> = block.txids().into_iter().collect();
    assert_eq!(ids.len(), 300);
    assert!(ids.iter().all(|outpoint| !created.contains(&outpoint.hash)));
}
