//! Spend splitting and settlement arithmetic.

use crate::model::AllocationType;
use rand::{
    Rng,
    seq::SliceRandom,
};
use solana_sdk::native_token::LAMPORTS_PER_SOL;

/// Added to every settlement to cover the purchases' network fees (0.02 SOL).
pub const FEE_ALLOWANCE_LAMPORTS: u64 = 20_000_000;
/// Charged per accepted pre-purchase reroll (0.001 SOL).
pub const REROLL_FEE_LAMPORTS: u64 = 1_000_000;
/// Lower bound for any coin's share under a random split.
pub const MIN_PERCENT: f64 = 5.0;

/// Display names offered when the backend lists no categories, with their themes.
pub const THEME_MAP: [(&str, &str); 10] = [
    ("PolitiFi", "celebrities"),
    ("Animals", "animals"),
    ("Gaming", "ogMemes"),
    ("Sports", "pepe"),
    ("Music", "food"),
    ("Celebrities", "celebrities"),
    ("OG Memes", "ogMemes"),
    ("Pepe", "pepe"),
    ("Food", "food"),
    ("Mixed", "mixed"),
];

/// Backend identifier for a display category name.
pub fn contract_theme(display_name: &str) -> String {
    THEME_MAP
        .iter()
        .find(|(name, _)| *name == display_name)
        .map(|(_, theme)| theme.to_string())
        .unwrap_or_else(|| display_name.to_lowercase())
}

/// Per-token spend. A random split without a matching percentage per coin
/// falls back to an equal split.
pub fn spend_amounts(
    investment: f64,
    num_coins: u8,
    allocation: AllocationType,
    percentages: Option<&[f64]>,
) -> Vec<f64> {
    let count = num_coins as usize;
    match (allocation, percentages) {
        (AllocationType::Random, Some(percentages)) if percentages.len() == count => percentages
            .iter()
            .map(|p| investment * p / 100.0)
            .collect(),
        _ => vec![investment / count as f64; count],
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Skewed random shares in percent, one decimal each, summing to 100 with
/// every share at least [`MIN_PERCENT`].
pub fn random_percentages<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }

    let weights: Vec<f64> = (0..count).map(|_| rng.random::<f64>().sqrt()).collect();
    let total: f64 = weights.iter().sum();
    let mut shares: Vec<f64> = if total > 0.0 {
        weights.iter().map(|w| round1(w / total * 100.0)).collect()
    } else {
        vec![100.0 / count as f64; count]
    };

    for share in shares.iter_mut() {
        *share = share.max(MIN_PERCENT);
    }
    let floor_total = MIN_PERCENT * count as f64;
    let sum: f64 = shares.iter().sum();
    if sum > 100.0 && sum > floor_total {
        let scale = (100.0 - floor_total) / (sum - floor_total);
        for share in shares.iter_mut() {
            *share = round1(MIN_PERCENT + (*share - MIN_PERCENT) * scale).max(MIN_PERCENT);
        }
    }

    let residue = 100.0 - shares.iter().sum::<f64>();
    if residue.abs() > f64::EPSILON {
        let largest = shares
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        shares[largest] = round1(shares[largest] + residue);
    }

    shares.shuffle(rng);
    shares
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round().max(0.0) as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Total moved to the settlement address: the investment, the fee allowance
/// and the accrued reroll fees.
pub fn settlement_lamports(investment: f64, reroll_count: u32) -> u64 {
    sol_to_lamports(investment)
        + FEE_ALLOWANCE_LAMPORTS
        + u64::from(reroll_count) * REROLL_FEE_LAMPORTS
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    #[test]
    fn contract_theme__maps_known_names_and_lowercases_the_rest() {
        assert_eq!(contract_theme("PolitiFi"), "celebrities");
        assert_eq!(contract_theme("OG Memes"), "ogMemes");
        assert_eq!(contract_theme("Sports"), "pepe");
        assert_eq!(contract_theme("Space Cats"), "space cats");
    }

    #[test]
    fn spend_amounts__equal_split_of_half_sol_over_four_coins() {
        // when
        let amounts = spend_amounts(0.5, 4, AllocationType::Equal, None);

        // then
        assert_eq!(amounts, vec![0.125; 4]);
    }

    #[test]
    fn spend_amounts__random_without_matching_percentages_falls_back_to_equal() {
        let missing = spend_amounts(0.5, 4, AllocationType::Random, None);
        let mismatched = spend_amounts(0.5, 4, AllocationType::Random, Some(&[50.0, 50.0]));

        assert_eq!(missing, vec![0.125; 4]);
        assert_eq!(mismatched, vec![0.125; 4]);
    }

    #[test]
    fn spend_amounts__random_applies_percentages_in_order() {
        // when
        let amounts = spend_amounts(2.0, 2, AllocationType::Random, Some(&[25.0, 75.0]));

        // then
        assert_eq!(amounts, vec![0.5, 1.5]);
    }

    #[test]
    fn settlement_lamports__adds_fee_allowance_and_reroll_fees() {
        assert_eq!(settlement_lamports(0.5, 0), 520_000_000);
        assert_eq!(settlement_lamports(0.5, 3), 523_000_000);
        assert_eq!(settlement_lamports(0.1, 1), 121_000_000);
    }

    #[test]
    fn random_percentages__single_coin_takes_everything() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(random_percentages(1, &mut rng), vec![100.0]);
        assert!(random_percentages(0, &mut rng).is_empty());
    }

    proptest! {
        #[test]
        fn random_percentages__sum_to_hundred_with_floor(
            seed in any::<u64>(),
            count in prop::sample::select(vec![2usize, 4, 6, 8]),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);

            let shares = random_percentages(count, &mut rng);

            prop_assert_eq!(shares.len(), count);
            let sum: f64 = shares.iter().sum();
            prop_assert!((sum - 100.0).abs() <= 0.1, "sum was {}", sum);
            for share in &shares {
                prop_assert!(*share >= MIN_PERCENT, "share {} below floor", share);
            }
        }

        #[test]
        fn settlement_lamports__is_linear_in_reroll_count(
            investment_lamports in 1u64..100_000_000_000,
            rerolls in 0u32..1_000,
        ) {
            let investment = lamports_to_sol(investment_lamports);

            let total = settlement_lamports(investment, rerolls);

            prop_assert_eq!(
                total,
                investment_lamports + FEE_ALLOWANCE_LAMPORTS + u64::from(rerolls) * REROLL_FEE_LAMPORTS
            );
        }
    }
}
