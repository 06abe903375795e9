use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use xec_primitives::chainhash::Hash256;
use xec_primitives::ec::PrivateKey;
use xec_script::{Address, Script};
use xec_transaction::{
    InputDescriptor, KeyPairs, OutPoint, Transaction, TxInput, TxOutput, XPubKey, DEFAULT_SEQUENCE,
};

fn key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed; 32]).unwrap()
}

fn pubkey(seed: u8) -> Vec<u8> {
    key(seed).pub_key().to_compressed().to_vec()
}

/// Inputs with arbitrary scriptSigs, outputs with arbitrary scripts.
fn arb_raw_transaction() -> impl Strategy<Value = Transaction> {
    let arb_input = (
        prop::array::uniform32(any::<u8>()),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 0..64),
        any::<u32>(),
    )
        .prop_map(|(hash, n, script_sig, sequence)| {
            TxInput::from_script_sig(OutPoint::new(Hash256::new(hash), n), sequence, script_sig)
        });

    let arb_output = (0..=i64::MAX as u64, prop::collection::vec(any::<u8>(), 0..64))
        .prop_map(|(value, script)| TxOutput::from_script(&Script::from_bytes(&script), value));

    (
        any::<i32>(),
        prop::collection::vec(arb_input, 1..4),
        prop::collection::vec(arb_output, 1..4),
        any::<u32>(),
    )
        .prop_map(|(version, inputs, outputs, locktime)| {
            let mut tx = Transaction::from_io(inputs, outputs, locktime, false);
            tx.version = version;
            tx
        })
}

fn multisig_tx(m: usize, seeds: &[u8]) -> Transaction {
    let xs = seeds.iter().map(|&s| XPubKey::PubKey(pubkey(s))).collect();
    let keys = InputDescriptor::p2sh_multisig(m, xs).unwrap();
    let input = TxInput::from_descriptor(
        OutPoint::new(Hash256::new([1; 32]), 0),
        DEFAULT_SEQUENCE,
        keys,
        Some(100_000),
    )
    .unwrap();
    let output = TxOutput::new(Address::from_p2pkh_hash([9; 20]), 90_000);
    Transaction::from_io(vec![input], vec![output], 0, false)
}

fn keypair(seed: u8) -> KeyPairs {
    let mut pairs = KeyPairs::new();
    pairs.insert(pubkey(seed), (key(seed), true));
    pairs
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn raw_transaction_bytes_roundtrip(tx in arb_raw_transaction()) {
        let bytes = tx.to_bytes();
        let parsed = Transaction::from_bytes(&bytes).unwrap();
        prop_assert_eq!(parsed.to_bytes(), bytes);
        prop_assert_eq!(Transaction::from_hex(&tx.to_hex()).unwrap().to_hex(), tx.to_hex());
    }

    #[test]
    fn fee_is_input_minus_output(
        inputs in prop::collection::vec(1u64..1_000_000_000, 1..5),
        outputs in prop::collection::vec(0u64..1_000_000_000, 1..5),
    ) {
        let ins = inputs.iter().enumerate().map(|(n, &value)| {
            let keys = InputDescriptor::p2pkh(XPubKey::PubKey(pubkey(1))).unwrap();
            TxInput::from_descriptor(
                OutPoint::new(Hash256::new([2; 32]), n as u32),
                DEFAULT_SEQUENCE,
                keys,
                Some(value),
            )
            .unwrap()
        });
        let outs = outputs
            .iter()
            .map(|&value| TxOutput::new(Address::from_p2pkh_hash([3; 20]), value));
        let tx = Transaction::from_io(ins.collect(), outs.collect(), 0, false);
        prop_assert_eq!(
            tx.input_value().unwrap() as i64 - tx.output_value().unwrap() as i64,
            tx.get_fee().unwrap()
        );
    }

    #[test]
    fn multisig_signature_independent_of_key_order(
        a in 1u8..=200,
        b in 1u8..=200,
        c in 1u8..=200,
    ) {
        prop_assume!(a != b && b != c && a != c);
        let mut forward = multisig_tx(2, &[a, b, c]);
        let mut backward = multisig_tx(2, &[c, b, a]);
        for seed in [a, c] {
            forward.sign(&keypair(seed)).unwrap();
            backward.sign(&keypair(seed)).unwrap();
        }
        prop_assert!(forward.is_complete());
        prop_assert_eq!(forward.inputs()[0].script_sig(), backward.inputs()[0].script_sig());
    }

    #[test]
    fn valid_sigs_grow_until_complete(order in Just(vec![1u8, 2, 3]).prop_shuffle()) {
        let mut tx = multisig_tx(3, &[1, 2, 3]);
        let mut last = 0;
        for seed in order {
            tx.sign(&keypair(seed)).unwrap();
            let input = &tx.inputs()[0];
            prop_assert!(input.num_valid_sigs() >= last);
            last = input.num_valid_sigs();
            prop_assert_eq!(input.is_complete(), last == input.num_required_sigs());
        }
        prop_assert!(tx.is_complete());
    }

    #[test]
    fn sort_outputs_puts_data_first(values in prop::collection::vec(0u64..10_000, 0..6), shuffle: bool, seed: u64) {
        let mut outputs: Vec<TxOutput> = values
            .iter()
            .map(|&v| TxOutput::new(Address::from_p2pkh_hash([(v % 7) as u8; 20]), v))
            .collect();
        outputs.push(TxOutput::from_script(&Script::op_return(&[b"memo"]), 0));
        let mut tx = Transaction::from_io(vec![], outputs, 0, false);
        let total = tx.output_value().unwrap();
        tx.sort_outputs(shuffle, &mut StdRng::seed_from_u64(seed));
        prop_assert!(tx.outputs()[0].is_opreturn());
        prop_assert_eq!(tx.output_value().unwrap(), total);
        if !shuffle {
            let rest: Vec<u64> = tx.outputs()[1..].iter().map(|o| o.value).collect();
            prop_assert!(rest.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
