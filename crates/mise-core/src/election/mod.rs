//! Vote counting for meal plan events.
//!
//! Each voter's ballot is built from their non-abstaining votes on an
//! event's options, ordered by rank (equal ranks fall back to option ID).
//! Options nobody ranked never enter the count. Whenever a tie has to be
//! broken the lowest option ID is picked, and the outcome records the
//! tie-break when it decided the winner.

use std::collections::{BTreeMap, BTreeSet};

use mise_db::models::{ElectionMethod, MealPlan, MealPlanOption};
use serde::Serialize;
use uuid::Uuid;

/// The result of counting one event's votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElectionOutcome {
    pub winner: Uuid,
    /// The winner depended on a lowest-ID tie-break.
    pub tiebroken: bool,
    /// Counting rounds performed (always 1 for first-past-the-post).
    pub rounds: usize,
}

/// Outcome for one event of a plan. `outcome` is `None` when nobody cast a
/// non-abstaining vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDecision {
    pub meal_plan_event_id: Uuid,
    pub outcome: Option<ElectionOutcome>,
}

/// Count the votes on one event's options with `method`.
pub fn decide_winner(method: ElectionMethod, options: &[MealPlanOption]) -> Option<ElectionOutcome> {
    let ballots = collect_ballots(options);
    if ballots.is_empty() {
        return None;
    }
    match method {
        ElectionMethod::RankedChoice => instant_runoff(&ballots),
        ElectionMethod::FirstPastThePost => first_past_the_post(&ballots),
    }
}

/// Run the plan's election method over every event.
pub fn decide_meal_plan(plan: &MealPlan) -> Vec<EventDecision> {
    plan.events
        .iter()
        .map(|event| EventDecision {
            meal_plan_event_id: event.id,
            outcome: decide_winner(plan.election_method, &event.options),
        })
        .collect()
}

/// One ranked option list per voter, most preferred first.
fn collect_ballots(options: &[MealPlanOption]) -> Vec<Vec<Uuid>> {
    let mut by_voter: BTreeMap<Uuid, Vec<(i32, Uuid)>> = BTreeMap::new();
    for option in options {
        for vote in option.votes.iter().filter(|v| !v.abstain) {
            by_voter
                .entry(vote.by_user)
                .or_default()
                .push((vote.rank, option.id));
        }
    }

    by_voter
        .into_values()
        .map(|mut ranked| {
            ranked.sort();
            ranked.into_iter().map(|(_, option_id)| option_id).collect()
        })
        .collect()
}

fn instant_runoff(ballots: &[Vec<Uuid>]) -> Option<ElectionOutcome> {
    let candidates: BTreeSet<Uuid> = ballots.iter().flatten().copied().collect();
    runoff(ballots, candidates, 0)
}

/// Count rounds over `remaining` until one option holds a majority of the
/// ballots still active or is the only one left.
///
/// A tie for fewest votes eliminates the lowest ID. The outcome is flagged
/// as tiebroken only when eliminating another tied option would have
/// produced a different winner.
fn runoff(
    ballots: &[Vec<Uuid>],
    mut remaining: BTreeSet<Uuid>,
    mut rounds: usize,
) -> Option<ElectionOutcome> {
    loop {
        rounds += 1;

        if remaining.len() == 1 {
            let winner = *remaining.first()?;
            return Some(ElectionOutcome {
                winner,
                tiebroken: false,
                rounds,
            });
        }

        let mut tally: BTreeMap<Uuid, usize> = remaining.iter().map(|id| (*id, 0)).collect();
        for ballot in ballots {
            if let Some(choice) = ballot.iter().find(|id| remaining.contains(id)) {
                *tally.entry(*choice).or_default() += 1;
            }
        }
        let active: usize = tally.values().sum();

        // Every candidate left is on some ballot, so `active` is only zero
        // if that stops holding; fall back to the lowest ID.
        if active == 0 {
            let winner = *remaining.first()?;
            return Some(ElectionOutcome {
                winner,
                tiebroken: true,
                rounds,
            });
        }

        if let Some((&leader, _)) = tally.iter().find(|(_, votes)| **votes * 2 > active) {
            return Some(ElectionOutcome {
                winner: leader,
                tiebroken: false,
                rounds,
            });
        }

        // Options nobody currently ranks first hold no ballots, so they can
        // all go at once in any order.
        let empty: Vec<Uuid> = tally
            .iter()
            .filter(|(_, votes)| **votes == 0)
            .map(|(id, _)| *id)
            .collect();
        if !empty.is_empty() {
            for id in &empty {
                remaining.remove(id);
            }
            continue;
        }

        let fewest = *tally.values().min()?;
        // BTreeMap iteration is ordered, so the first trailing option has
        // the lowest ID.
        let trailing: Vec<Uuid> = tally
            .iter()
            .filter(|(_, votes)| **votes == fewest)
            .map(|(id, _)| *id)
            .collect();
        let (&eliminated, others) = trailing.split_first()?;
        if others.is_empty() {
            remaining.remove(&eliminated);
            continue;
        }

        let without = |id: Uuid| {
            let mut rest = remaining.clone();
            rest.remove(&id);
            rest
        };
        let mut outcome = runoff(ballots, without(eliminated), rounds)?;
        for &other in others {
            if runoff(ballots, without(other), rounds)?.winner != outcome.winner {
                outcome.tiebroken = true;
                break;
            }
        }
        return Some(outcome);
    }
}

fn first_past_the_post(ballots: &[Vec<Uuid>]) -> Option<ElectionOutcome> {
    let mut tally: BTreeMap<Uuid, usize> = BTreeMap::new();
    for choice in ballots.iter().filter_map(|ballot| ballot.first()) {
        *tally.entry(*choice).or_default() += 1;
    }

    let most = *tally.values().max()?;
    let mut leaders = tally
        .iter()
        .filter(|(_, votes)| **votes == most)
        .map(|(id, _)| *id);
    let winner = leaders.next()?;
    Some(ElectionOutcome {
        winner,
        tiebroken: leaders.next().is_some(),
        rounds: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mise_test_utils::fixtures;

    /// Options of a fresh event with IDs 1..=n, so ID order is position order.
    fn options(n: u128) -> Vec<MealPlanOption> {
        let plan = fixtures::meal_plan(ElectionMethod::RankedChoice);
        let event = fixtures::event(&plan, "dinner", Utc::now());
        let meal = fixtures::meal("stew", vec![]);
        (1..=n)
            .map(|i| {
                let mut option = fixtures::option(&event, &meal, 1.0);
                option.id = Uuid::from_u128(i);
                option
            })
            .collect()
    }

    #[test]
    fn runoff_transfers_eliminated_ballots() {
        // A>B>C, A>C>B, B>A>C, B>C>A, C>B>A
        let mut opts = options(3);
        fixtures::cast_ballot(&mut opts, &[0, 1, 2]);
        fixtures::cast_ballot(&mut opts, &[0, 2, 1]);
        fixtures::cast_ballot(&mut opts, &[1, 0, 2]);
        fixtures::cast_ballot(&mut opts, &[1, 2, 0]);
        fixtures::cast_ballot(&mut opts, &[2, 1, 0]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[1].id);
        assert!(!outcome.tiebroken);
        assert_eq!(outcome.rounds, 2);
    }

    #[test]
    fn first_round_majority_wins_immediately() {
        let mut opts = options(3);
        fixtures::cast_ballot(&mut opts, &[2, 0]);
        fixtures::cast_ballot(&mut opts, &[2]);
        fixtures::cast_ballot(&mut opts, &[0, 2]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[2].id);
        assert_eq!(outcome.rounds, 1);
    }

    #[test]
    fn runoff_elimination_tie_drops_lowest_id() {
        // A=1, B=1, C=2: A and B tie for fewest; A (lowest ID) goes and its
        // ballot moves to B, giving B=2, C=2. B (lower ID) is then eliminated
        // in a second tie, so C wins.
        let mut opts = options(3);
        fixtures::cast_ballot(&mut opts, &[0, 1]);
        fixtures::cast_ballot(&mut opts, &[1]);
        fixtures::cast_ballot(&mut opts, &[2]);
        fixtures::cast_ballot(&mut opts, &[2]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[2].id);
        assert!(outcome.tiebroken);
    }

    #[test]
    fn options_nobody_ranks_first_drop_without_a_tie_break() {
        // A>C, A>D, B>C, B>D, E>A: C and D both start at zero and go
        // together, then E goes and its ballot carries A to a majority.
        let mut opts = options(5);
        fixtures::cast_ballot(&mut opts, &[0, 2]);
        fixtures::cast_ballot(&mut opts, &[0, 3]);
        fixtures::cast_ballot(&mut opts, &[1, 2]);
        fixtures::cast_ballot(&mut opts, &[1, 3]);
        fixtures::cast_ballot(&mut opts, &[4, 0]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[0].id);
        assert!(!outcome.tiebroken);
        assert_eq!(outcome.rounds, 3);
    }

    #[test]
    fn tie_that_cannot_change_the_winner_is_not_flagged() {
        // A=2, B=1, C=1 with B and C both transferring to A: whichever of B
        // and C goes first, A reaches a majority.
        let mut opts = options(3);
        fixtures::cast_ballot(&mut opts, &[0]);
        fixtures::cast_ballot(&mut opts, &[0]);
        fixtures::cast_ballot(&mut opts, &[1, 0]);
        fixtures::cast_ballot(&mut opts, &[2, 0]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[0].id);
        assert!(!outcome.tiebroken);
        assert_eq!(outcome.rounds, 2);
    }

    #[test]
    fn exhausted_ballots_do_not_count_toward_majority() {
        // A=2, B=2, C=1 with C's voter ranking only C: after C goes, A and B
        // stay tied at 2 of 4 active ballots, A is eliminated on ID, B wins.
        let mut opts = options(3);
        fixtures::cast_ballot(&mut opts, &[0]);
        fixtures::cast_ballot(&mut opts, &[0]);
        fixtures::cast_ballot(&mut opts, &[1]);
        fixtures::cast_ballot(&mut opts, &[1]);
        fixtures::cast_ballot(&mut opts, &[2]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[1].id);
        assert!(outcome.tiebroken);
        assert_eq!(outcome.rounds, 3);
    }

    #[test]
    fn first_past_the_post_counts_first_preferences_only() {
        let mut opts = options(3);
        fixtures::cast_ballot(&mut opts, &[0, 1]);
        fixtures::cast_ballot(&mut opts, &[1, 0]);
        fixtures::cast_ballot(&mut opts, &[1, 2]);
        fixtures::cast_ballot(&mut opts, &[2, 1]);

        let outcome = decide_winner(ElectionMethod::FirstPastThePost, &opts).unwrap();
        assert_eq!(outcome.winner, opts[1].id);
        assert!(!outcome.tiebroken);
        assert_eq!(outcome.rounds, 1);
    }

    #[test]
    fn first_past_the_post_tie_goes_to_lowest_id() {
        let mut opts = options(2);
        fixtures::cast_ballot(&mut opts, &[1]);
        fixtures::cast_ballot(&mut opts, &[0]);

        let outcome = decide_winner(ElectionMethod::FirstPastThePost, &opts).unwrap();
        assert_eq!(outcome.winner, opts[0].id);
        assert!(outcome.tiebroken);
    }

    #[test]
    fn all_abstain_chooses_nothing() {
        let mut opts = options(3);
        fixtures::abstain_all(&mut opts);
        fixtures::abstain_all(&mut opts);
        assert_eq!(decide_winner(ElectionMethod::RankedChoice, &opts), None);
        assert_eq!(decide_winner(ElectionMethod::FirstPastThePost, &opts), None);
    }

    #[test]
    fn abstentions_are_ignored_next_to_real_votes() {
        let mut opts = options(2);
        fixtures::abstain_all(&mut opts);
        fixtures::cast_ballot(&mut opts, &[1]);

        let outcome = decide_winner(ElectionMethod::RankedChoice, &opts).unwrap();
        assert_eq!(outcome.winner, opts[1].id);
        assert!(!outcome.tiebroken);
    }

    #[test]
    fn no_votes_chooses_nothing() {
        assert_eq!(decide_winner(ElectionMethod::RankedChoice, &options(2)), None);
        assert_eq!(decide_winner(ElectionMethod::RankedChoice, &[]), None);
    }

    /// Every ordered, non-empty selection of `0..n`.
    fn all_rankings(n: usize) -> Vec<Vec<usize>> {
        fn extend(prefix: Vec<usize>, n: usize, out: &mut Vec<Vec<usize>>) {
            for next in 0..n {
                if prefix.contains(&next) {
                    continue;
                }
                let mut ranking = prefix.clone();
                ranking.push(next);
                out.push(ranking.clone());
                extend(ranking, n, out);
            }
        }
        let mut out = Vec::new();
        extend(Vec::new(), n, &mut out);
        out
    }

    #[test]
    fn runoff_always_picks_exactly_one_ranked_option() {
        let rankings = all_rankings(3);
        assert_eq!(rankings.len(), 15);

        for a in &rankings {
            for b in &rankings {
                for c in &rankings {
                    let mut opts = options(3);
                    for ranking in [a, b, c] {
                        fixtures::cast_ballot(&mut opts, ranking);
                    }
                    for method in [ElectionMethod::RankedChoice, ElectionMethod::FirstPastThePost] {
                        let outcome = decide_winner(method, &opts)
                            .unwrap_or_else(|| panic!("no winner for {a:?} {b:?} {c:?}"));
                        let position = opts
                            .iter()
                            .position(|o| o.id == outcome.winner)
                            .expect("winner is one of the options");
                        assert!(
                            [a, b, c].iter().any(|r| r.contains(&position)),
                            "winner {position} was ranked by nobody"
                        );
                        assert!(outcome.rounds <= 3);
                    }
                }
            }
        }
    }

    #[test]
    fn decide_meal_plan_covers_every_event() {
        let mut plan = fixtures::meal_plan(ElectionMethod::RankedChoice);
        let meal = fixtures::meal("stew", vec![]);

        let mut voted = fixtures::event(&plan, "dinner", Utc::now());
        voted.options = vec![
            fixtures::option(&voted, &meal, 1.0),
            fixtures::option(&voted, &meal, 1.0),
        ];
        fixtures::cast_ballot(&mut voted.options, &[1, 0]);
        let winner = voted.options[1].id;

        let mut ignored = fixtures::event(&plan, "lunch", Utc::now());
        ignored.options = vec![fixtures::option(&ignored, &meal, 1.0)];
        fixtures::abstain_all(&mut ignored.options);

        plan.events = vec![voted, ignored];
        let decisions = decide_meal_plan(&plan);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].outcome.map(|o| o.winner), Some(winner));
        assert_eq!(decisions[1].meal_plan_event_id, plan.events[1].id);
        assert_eq!(decisions[1].outcome, None);
    }
}
