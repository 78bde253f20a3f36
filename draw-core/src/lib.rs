//! Gift draw assignment generator.
//!
//! Produces a random derangement of a roster in which nobody draws themselves
//! and nobody draws a participant they are excluded from. Generation is a
//! bounded loop of shuffle, greedy repair and full validation; when the budget
//! runs out the draw fails with [`DrawError::Infeasible`].

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

pub type ParticipantId = String;

/// Giver -> recipients that giver must not be assigned.
pub type Exclusions = HashMap<ParticipantId, HashSet<ParticipantId>>;

/// Giver -> recipient.
pub type Assignment = BTreeMap<ParticipantId, ParticipantId>;

pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawConfig {
    pub max_attempts: usize,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidRoster {
    #[error("at least 2 participants required, got {count}")]
    TooFewParticipants { count: usize },
    #[error("duplicate participant {0:?}")]
    DuplicateParticipant(ParticipantId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    #[error("invalid roster: {0}")]
    InvalidRoster(#[from] InvalidRoster),
    #[error("no valid assignment found in {attempts} attempts")]
    Infeasible { attempts: usize },
}

/// First problem found when checking a mapping against a roster.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("{0:?} is assigned to themselves")]
    SelfAssigned(ParticipantId),
    #[error("{giver:?} may not give to {recipient:?}")]
    Excluded {
        giver: ParticipantId,
        recipient: ParticipantId,
    },
    #[error("giver {0:?} is not on the roster")]
    UnknownGiver(ParticipantId),
    #[error("recipient {0:?} is not on the roster")]
    UnknownRecipient(ParticipantId),
    #[error("{0:?} has no recipient")]
    MissingGiver(ParticipantId),
    #[error("{0:?} is drawn more than once")]
    DuplicateRecipient(ParticipantId),
}

/// Draws an assignment with the default attempt budget.
pub fn generate<R>(
    participants: &[ParticipantId],
    exclusions: &Exclusions,
    rng: &mut R,
) -> Result<Assignment, DrawError>
where
    R: Rng + ?Sized,
{
    generate_with(participants, exclusions, rng, &DrawConfig::default())
}

/// Draws an assignment, trying at most `config.max_attempts` shuffles.
///
/// Every returned mapping passes [`validate`]. No partial mapping is ever
/// returned.
pub fn generate_with<R>(
    participants: &[ParticipantId],
    exclusions: &Exclusions,
    rng: &mut R,
    config: &DrawConfig,
) -> Result<Assignment, DrawError>
where
    R: Rng + ?Sized,
{
    check_roster(participants)?;

    for _ in 0..config.max_attempts {
        let mut recipients = construct(participants, rng);

        let valid = pairings_allowed(participants, &recipients, exclusions)
            || repair(participants, &mut recipients, exclusions);
        if !valid {
            continue;
        }

        let assignment: Assignment = participants.iter().cloned().zip(recipients).collect();
        if validate(participants, exclusions, &assignment).is_ok() {
            return Ok(assignment);
        }
    }

    Err(DrawError::Infeasible {
        attempts: config.max_attempts,
    })
}

/// Checks that `assignment` is a derangement of `participants` that respects
/// `exclusions`.
pub fn validate(
    participants: &[ParticipantId],
    exclusions: &Exclusions,
    assignment: &Assignment,
) -> Result<(), Violation> {
    let roster: HashSet<&str> = participants.iter().map(String::as_str).collect();

    if let Some(giver) = assignment.keys().find(|g| !roster.contains(g.as_str())) {
        return Err(Violation::UnknownGiver(giver.clone()));
    }

    let mut drawn = HashSet::with_capacity(participants.len());
    for giver in participants {
        let recipient = assignment
            .get(giver)
            .ok_or_else(|| Violation::MissingGiver(giver.clone()))?;
        if !roster.contains(recipient.as_str()) {
            return Err(Violation::UnknownRecipient(recipient.clone()));
        }
        if !drawn.insert(recipient.as_str()) {
            return Err(Violation::DuplicateRecipient(recipient.clone()));
        }
        if recipient == giver {
            return Err(Violation::SelfAssigned(giver.clone()));
        }
        if is_excluded(giver, recipient, exclusions) {
            return Err(Violation::Excluded {
                giver: giver.clone(),
                recipient: recipient.clone(),
            });
        }
    }

    Ok(())
}

/// Closes `exclusions` under symmetry: if a excludes b, b excludes a.
pub fn symmetric_exclusions(exclusions: &Exclusions) -> Exclusions {
    let mut closed = exclusions.clone();
    for (giver, excluded) in exclusions {
        for other in excluded {
            closed
                .entry(other.clone())
                .or_default()
                .insert(giver.clone());
        }
    }
    closed
}

fn check_roster(participants: &[ParticipantId]) -> Result<(), InvalidRoster> {
    if participants.len() < 2 {
        return Err(InvalidRoster::TooFewParticipants {
            count: participants.len(),
        });
    }

    let mut seen = HashSet::with_capacity(participants.len());
    for id in participants {
        if !seen.insert(id.as_str()) {
            return Err(InvalidRoster::DuplicateParticipant(id.clone()));
        }
    }
    Ok(())
}

fn is_excluded(giver: &str, recipient: &str, exclusions: &Exclusions) -> bool {
    exclusions
        .get(giver)
        .is_some_and(|excluded| excluded.contains(recipient))
}

fn allowed(giver: &str, recipient: &str, exclusions: &Exclusions) -> bool {
    giver != recipient && !is_excluded(giver, recipient, exclusions)
}

fn pairings_allowed(
    participants: &[ParticipantId],
    recipients: &[ParticipantId],
    exclusions: &Exclusions,
) -> bool {
    participants
        .iter()
        .zip(recipients)
        .all(|(giver, recipient)| allowed(giver, recipient, exclusions))
}

// Shuffle, then break each fixed point by swapping with the next slot
// (last wraps to first). A swap can create a new violation; validation
// catches it.
fn construct<R>(participants: &[ParticipantId], rng: &mut R) -> Vec<ParticipantId>
where
    R: Rng + ?Sized,
{
    let mut shuffled = participants.to_vec();
    shuffled.shuffle(rng);
    break_fixed_points(participants, &mut shuffled);
    shuffled
}

fn break_fixed_points(participants: &[ParticipantId], recipients: &mut [ParticipantId]) {
    let n = recipients.len();
    for i in 0..n {
        if recipients[i] == participants[i] {
            recipients.swap(i, (i + 1) % n);
        }
    }
}

// Greedy: each invalid pairing takes the first swap, in roster order, that
// leaves both givers valid. No backtracking.
fn repair(
    participants: &[ParticipantId],
    recipients: &mut [ParticipantId],
    exclusions: &Exclusions,
) -> bool {
    for i in 0..participants.len() {
        if allowed(&participants[i], &recipients[i], exclusions) {
            continue;
        }

        let partner = (0..participants.len()).filter(|&j| j != i).find(|&j| {
            allowed(&participants[i], &recipients[j], exclusions)
                && allowed(&participants[j], &recipients[i], exclusions)
        });

        match partner {
            Some(j) => recipients.swap(i, j),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn roster(names: &[&str]) -> Vec<ParticipantId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn exclusions(pairs: &[(&str, &str)]) -> Exclusions {
        let mut map = Exclusions::new();
        for (giver, recipient) in pairs {
            map.entry(giver.to_string())
                .or_default()
                .insert(recipient.to_string());
        }
        map
    }

    fn assert_derangement(people: &[ParticipantId], excl: &Exclusions, assignment: &Assignment) {
        let givers: HashSet<&String> = assignment.keys().collect();
        let recipients: HashSet<&String> = assignment.values().collect();
        let expected: HashSet<&String> = people.iter().collect();
        assert_eq!(givers, expected);
        assert_eq!(recipients, expected);
        assert_eq!(assignment.len(), people.len());
        for (giver, recipient) in assignment {
            assert_ne!(giver, recipient);
            assert!(!is_excluded(giver, recipient, excl));
        }
    }

    /// Always yields zero, so every `gen_range` lands on its lower bound.
    struct ZeroRng;

    impl RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    #[test]
    fn example_roster_respects_exclusion() {
        let people = roster(&["Alice", "Bob", "Charlie", "Danielle"]);
        let excl = exclusions(&[("Alice", "Bob")]);

        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let assignment = generate(&people, &excl, &mut rng).unwrap();
            assert_derangement(&people, &excl, &assignment);
            let alice = assignment["Alice"].as_str();
            assert!(alice == "Charlie" || alice == "Danielle", "Alice drew {alice}");
        }
    }

    #[test]
    fn mutual_exclusion_of_two_is_infeasible() {
        let people = roster(&["Alice", "Bob"]);
        let excl = exclusions(&[("Alice", "Bob"), ("Bob", "Alice")]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let err = generate(&people, &excl, &mut rng).unwrap_err();
        assert_eq!(
            err,
            DrawError::Infeasible {
                attempts: DEFAULT_MAX_ATTEMPTS
            }
        );
    }

    #[test]
    fn participant_excluded_from_everyone_is_infeasible() {
        let people = roster(&["a", "b", "c", "d"]);
        let excl = exclusions(&[("a", "b"), ("a", "c"), ("a", "d")]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let err = generate(&people, &excl, &mut rng).unwrap_err();
        assert!(matches!(err, DrawError::Infeasible { .. }));
    }

    #[test]
    fn three_with_symmetric_pair_is_infeasible() {
        // Both 3-cycles use the a<->b edge in one direction.
        let people = roster(&["a", "b", "c"]);
        let excl = symmetric_exclusions(&exclusions(&[("a", "b")]));
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        assert!(matches!(
            generate(&people, &excl, &mut rng),
            Err(DrawError::Infeasible { .. })
        ));
    }

    #[test]
    fn attempt_budget_is_honoured_with_degenerate_rng() {
        let people = roster(&["Alice", "Bob"]);
        let excl = symmetric_exclusions(&exclusions(&[("Alice", "Bob")]));
        let config = DrawConfig { max_attempts: 7 };

        let err = generate_with(&people, &excl, &mut ZeroRng, &config).unwrap_err();
        assert_eq!(err, DrawError::Infeasible { attempts: 7 });

        let none = DrawConfig { max_attempts: 0 };
        let err = generate_with(&people, &Exclusions::new(), &mut ZeroRng, &none).unwrap_err();
        assert_eq!(err, DrawError::Infeasible { attempts: 0 });
    }

    #[test]
    fn degenerate_rng_still_draws_without_exclusions() {
        let people = roster(&["a", "b", "c", "d"]);
        let assignment = generate(&people, &Exclusions::new(), &mut ZeroRng).unwrap();
        assert_derangement(&people, &Exclusions::new(), &assignment);
    }

    #[test]
    fn rejects_too_few_participants() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = generate(&roster(&["solo"]), &Exclusions::new(), &mut rng).unwrap_err();
        assert_eq!(
            err,
            DrawError::InvalidRoster(InvalidRoster::TooFewParticipants { count: 1 })
        );

        let err = generate(&[], &Exclusions::new(), &mut rng).unwrap_err();
        assert_eq!(
            err,
            DrawError::InvalidRoster(InvalidRoster::TooFewParticipants { count: 0 })
        );
    }

    #[test]
    fn rejects_duplicate_participants() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let people = roster(&["a", "b", "a"]);
        let err = generate(&people, &Exclusions::new(), &mut rng).unwrap_err();
        assert_eq!(
            err,
            DrawError::InvalidRoster(InvalidRoster::DuplicateParticipant("a".into()))
        );
    }

    #[test]
    fn validate_accepts_cyclic_shift() {
        let people = roster(&["p0", "p1", "p2", "p3", "p4", "p5"]);
        let assignment: Assignment = people
            .iter()
            .enumerate()
            .map(|(i, giver)| (giver.clone(), people[(i + 1) % people.len()].clone()))
            .collect();

        assert_eq!(validate(&people, &Exclusions::new(), &assignment), Ok(()));
    }

    #[test]
    fn validate_rejects_forced_self_pairing() {
        let people = roster(&["p0", "p1", "p2", "p3", "p4", "p5"]);
        // p0 keeps its own gift, the rest rotate among themselves.
        let mut assignment = Assignment::new();
        assignment.insert("p0".into(), "p0".into());
        for i in 1..6 {
            let next = if i == 5 { 1 } else { i + 1 };
            assignment.insert(format!("p{i}"), format!("p{next}"));
        }

        assert_eq!(
            validate(&people, &Exclusions::new(), &assignment),
            Err(Violation::SelfAssigned("p0".into()))
        );
    }

    #[test]
    fn validate_reports_structural_problems() {
        let people = roster(&["a", "b", "c"]);
        let none = Exclusions::new();

        let mut missing = Assignment::new();
        missing.insert("a".into(), "b".into());
        missing.insert("b".into(), "a".into());
        assert_eq!(
            validate(&people, &none, &missing),
            Err(Violation::MissingGiver("c".into()))
        );

        let mut duplicate = missing.clone();
        duplicate.insert("c".into(), "a".into());
        assert_eq!(
            validate(&people, &none, &duplicate),
            Err(Violation::DuplicateRecipient("a".into()))
        );

        let mut stranger = duplicate.clone();
        stranger.insert("c".into(), "zed".into());
        assert_eq!(
            validate(&people, &none, &stranger),
            Err(Violation::UnknownRecipient("zed".into()))
        );

        let mut extra = stranger.clone();
        extra.insert("c".into(), "a".into());
        extra.insert("ghost".into(), "b".into());
        assert_eq!(
            validate(&people, &none, &extra),
            Err(Violation::UnknownGiver("ghost".into()))
        );

        let mut shifted = Assignment::new();
        shifted.insert("a".into(), "b".into());
        shifted.insert("b".into(), "c".into());
        shifted.insert("c".into(), "a".into());
        let excl = exclusions(&[("b", "c")]);
        assert_eq!(
            validate(&people, &excl, &shifted),
            Err(Violation::Excluded {
                giver: "b".into(),
                recipient: "c".into()
            })
        );
    }

    #[test]
    fn repair_takes_first_eligible_swap_in_roster_order() {
        let people = roster(&["A", "B", "C", "D"]);
        let excl = symmetric_exclusions(&exclusions(&[("A", "B")]));
        let mut recipients = roster(&["B", "A", "D", "C"]);

        assert!(repair(&people, &mut recipients, &excl));
        assert_eq!(recipients, roster(&["D", "C", "B", "A"]));
    }

    #[test]
    fn repair_gives_up_when_no_swap_fits() {
        let people = roster(&["A", "B"]);
        let excl = symmetric_exclusions(&exclusions(&[("A", "B")]));
        let mut recipients = roster(&["B", "A"]);

        assert!(!repair(&people, &mut recipients, &excl));
    }

    #[test]
    fn construct_with_zero_rng_rotates_roster() {
        // Zero rng shuffles [a, b, c, d] into [b, c, d, a].
        let people = roster(&["a", "b", "c", "d"]);
        let recipients = construct(&people, &mut ZeroRng);
        assert_eq!(recipients, roster(&["b", "c", "d", "a"]));
    }

    #[test]
    fn fixed_points_swap_with_next_slot() {
        let people = roster(&["a", "b", "c"]);

        let mut recipients = roster(&["a", "c", "b"]);
        break_fixed_points(&people, &mut recipients);
        assert_eq!(recipients, roster(&["c", "a", "b"]));

        // Last slot wraps to the first.
        let mut recipients = roster(&["b", "a", "c"]);
        break_fixed_points(&people, &mut recipients);
        assert_eq!(recipients, roster(&["c", "a", "b"]));
    }

    #[test]
    fn symmetric_exclusions_adds_reverse_edges() {
        let closed = symmetric_exclusions(&exclusions(&[("a", "b"), ("c", "a")]));
        assert!(closed["a"].contains("b"));
        assert!(closed["a"].contains("c"));
        assert!(closed["b"].contains("a"));
        assert!(closed["c"].contains("a"));
        assert_eq!(closed.len(), 3);
    }

    #[test]
    fn same_seed_same_draw() {
        let people: Vec<_> = (0..12).map(|i| format!("p{i}")).collect();
        let excl = symmetric_exclusions(&exclusions(&[("p0", "p1"), ("p2", "p3")]));

        let first = generate(&people, &excl, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let second = generate(&people, &excl, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fifty_participants_without_exclusions() {
        let people: Vec<_> = (0..50).map(|i| format!("participant-{i}")).collect();
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let assignment = generate(&people, &Exclusions::new(), &mut rng).unwrap();
            assert_derangement(&people, &Exclusions::new(), &assignment);
        }
    }

    proptest! {
        #[test]
        fn prop_no_exclusions_always_succeeds(n in 2usize..40, seed in any::<u64>()) {
            let people: Vec<_> = (0..n).map(|i| format!("p{i}")).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let assignment = generate(&people, &Exclusions::new(), &mut rng);
            prop_assert!(assignment.is_ok());
            let assignment = assignment.unwrap();
            prop_assert_eq!(validate(&people, &Exclusions::new(), &assignment), Ok(()));
            for (giver, recipient) in &assignment {
                prop_assert_ne!(giver, recipient);
            }
        }

        #[test]
        fn prop_accepted_draws_respect_exclusions(
            n in 3usize..20,
            pairs in proptest::collection::vec((0usize..20, 0usize..20), 0..4),
            seed in any::<u64>(),
        ) {
            let people: Vec<_> = (0..n).map(|i| format!("p{i}")).collect();
            let mut one_sided = Exclusions::new();
            for (a, b) in pairs {
                let (a, b) = (a % n, b % n);
                if a != b {
                    one_sided.entry(people[a].clone()).or_default().insert(people[b].clone());
                }
            }
            let excl = symmetric_exclusions(&one_sided);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            match generate(&people, &excl, &mut rng) {
                Ok(assignment) => {
                    prop_assert_eq!(validate(&people, &excl, &assignment), Ok(()));
                    let recipients: HashSet<&String> = assignment.values().collect();
                    prop_assert_eq!(recipients.len(), n);
                    for (giver, recipient) in &assignment {
                        prop_assert_ne!(giver, recipient);
                        prop_assert!(!excl.get(giver).is_some_and(|e| e.contains(recipient)));
                    }
                }
                Err(err) => prop_assert!(matches!(err, DrawError::Infeasible { .. }), "expected DrawError::Infeasible, got {:?}", err),
            }
        }
    }
}
