use crate::params::ProtocolParameters;

/// Linear fee for a transaction of `size` bytes carrying the given
/// aggregated script execution budget.
pub fn fee(pparams: &ProtocolParameters, size: usize, steps: i64, mem: i64) -> i64 {
    pparams.min_fee_a * size as i64
        + pparams.min_fee_b
        + (steps as f64 * pparams.price_step).ceil() as i64
        + (mem as f64 * pparams.price_mem).ceil() as i64
}

/// The worst case: a transaction at the size limit burning the whole
/// per-transaction execution budget. Used to seed balancing before the real
/// fee is known and to size the collateral budget.
pub fn max_tx_fee(pparams: &ProtocolParameters) -> i64 {
    fee(
        pparams,
        pparams.max_tx_size as usize,
        pparams.max_tx_ex_steps,
        pparams.max_tx_ex_mem,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_linear_in_size() {
        let pparams = ProtocolParameters::for_tests();
        let base = fee(&pparams, 0, 0, 0);

        assert_eq!(base, pparams.min_fee_b);
        assert_eq!(
            fee(&pparams, 100, 0, 0),
            pparams.min_fee_a * 100 + pparams.min_fee_b
        );
    }

    #[test]
    fn execution_units_round_up() {
        let pparams = ProtocolParameters::for_tests();
        let with_units = fee(&pparams, 0, 10, 10);

        assert_eq!(
            with_units,
            pparams.min_fee_b
                + (10.0 * pparams.price_step).ceil() as i64
                + (10.0 * pparams.price_mem).ceil() as i64
        );
    }

    #[test]
    fn max_tx_fee_uses_protocol_maxima() {
        let pparams = ProtocolParameters::for_tests();
        assert_eq!(
            max_tx_fee(&pparams),
            fee(
                &pparams,
                pparams.max_tx_size as usize,
                pparams.max_tx_ex_steps,
                pparams.max_tx_ex_mem
            )
        );
    }
}
