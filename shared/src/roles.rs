//! Role assignment: a uniformly random bijection from players to roles.

use crate::record::{PlayerEntry, Role, RoleEntry};
use crate::ROOM_SIZE;
use rand::seq::SliceRandom;
use rand::Rng;

/// Assigns each player one of the four roles, each role used exactly once.
///
/// `shuffle` is an in-place Fisher-Yates, so every one of the 24
/// permutations is equally likely; successive calls are independent.
/// The caller guarantees `players.len() == ROOM_SIZE`.
pub fn assign_roles(players: &[PlayerEntry], rng: &mut impl Rng) -> Vec<RoleEntry> {
    debug_assert_eq!(players.len(), ROOM_SIZE);

    let mut roles = Role::ALL;
    roles.shuffle(rng);

    players
        .iter()
        .zip(roles)
        .map(|(player, role)| RoleEntry {
            id: player.id.clone(),
            role,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn players() -> Vec<PlayerEntry> {
        ["a", "b", "c", "d"]
            .iter()
            .map(|id| PlayerEntry {
                id: id.to_string(),
                name: id.to_uppercase(),
            })
            .collect()
    }

    #[test]
    fn assignment_is_a_bijection() {
        let players = players();
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let assigned = assign_roles(&players, &mut rng);
            assert_eq!(assigned.len(), ROOM_SIZE);

            // Ids follow player order, every role appears exactly once.
            for (entry, player) in assigned.iter().zip(&players) {
                assert_eq!(entry.id, player.id);
            }
            for role in Role::ALL {
                assert_eq!(assigned.iter().filter(|e| e.role == role).count(), 1);
            }
        }
    }

    /// Chi-square test against the uniform distribution over all 24
    /// permutations. With 10 000 samples the expected count per
    /// permutation is ~416; the statistic for 23 degrees of freedom
    /// stays well below 80 unless the shuffle is biased.
    #[test]
    fn assignment_is_roughly_uniform() {
        let players = players();
        let mut rng = rand::thread_rng();
        let samples = 10_000usize;

        let mut counts: HashMap<u16, usize> = HashMap::new();
        for _ in 0..samples {
            let assigned = assign_roles(&players, &mut rng);
            let key = assigned.iter().fold(0u16, |acc, entry| {
                let digit = Role::ALL.iter().position(|r| *r == entry.role).unwrap();
                acc * 4 + digit as u16
            });
            *counts.entry(key).or_insert(0) += 1;
        }

        assert_eq!(counts.len(), 24, "every permutation should occur");

        let expected = samples as f64 / 24.0;
        let chi_square: f64 = counts
            .values()
            .map(|&observed| {
                let diff = observed as f64 - expected;
                diff * diff / expected
            })
            .sum();

        assert!(
            chi_square < 80.0,
            "chi-square {} suggests a biased shuffle",
            chi_square
        );
    }

    #[test]
    fn successive_assignments_differ() {
        // 20 draws from 24 permutations collide occasionally, but all 20
        // being identical means the generator is broken.
        let players = players();
        let mut rng = rand::thread_rng();

        let first = assign_roles(&players, &mut rng);
        let all_same = (0..20).all(|_| assign_roles(&players, &mut rng) == first);
        assert!(!all_same);
    }
}
