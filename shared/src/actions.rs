//! The round state machine: every legal client action expressed as a
//! pure function from the observed snapshot to a conditional patch.
//!
//! Nothing here performs I/O. Each transition-triggering patch carries an
//! `expected_phase` guard, so concurrent attempts by independently
//! observing clients collapse into a single effective transition at the
//! store; the losers receive `InvalidTransition` and simply wait for the
//! next snapshot.

use crate::codes;
use crate::error::ActionError;
use crate::patch::{ConditionalPatch, PatchOp};
use crate::record::{GuessRecord, Phase, PlayerEntry, RevealEntry, Role, RoomRecord};
use crate::roles::assign_roles;
use crate::{GUESS_TIMEOUT_MS, ROOM_SIZE};
use rand::Rng;

/// Fresh lobby record with the creator as `players[0]`.
pub fn initial_record(
    code: &str,
    host_name: &str,
    host_id: &str,
    now_ms: u64,
) -> Result<RoomRecord, ActionError> {
    if host_name.trim().is_empty() {
        return Err(ActionError::EmptyName);
    }
    if !codes::is_valid_code(code) {
        return Err(ActionError::BadRoomCode);
    }
    Ok(RoomRecord::new(code, host_name.trim(), host_id, now_ms))
}

/// Join patch, or `None` when `id` is already a member (a resync, not an
/// error; no write is issued).
pub fn join_room(
    record: &RoomRecord,
    id: &str,
    name: &str,
) -> Result<Option<ConditionalPatch>, ActionError> {
    if name.trim().is_empty() {
        return Err(ActionError::EmptyName);
    }
    if record.is_member(id) {
        return Ok(None);
    }
    if record.phase != Phase::Lobby {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if record.players.len() >= ROOM_SIZE {
        return Err(ActionError::RoomFull);
    }
    let patch = ConditionalPatch::when(Phase::Lobby).op(PatchOp::AddPlayer(PlayerEntry {
        id: id.to_string(),
        name: name.trim().to_string(),
    }));
    Ok(Some(patch))
}

/// `lobby -> reveal`: host only, exactly four players, roles freshly
/// assigned.
pub fn start_round(
    record: &RoomRecord,
    actor: &str,
    rng: &mut impl Rng,
) -> Result<ConditionalPatch, ActionError> {
    if record.phase != Phase::Lobby {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if !record.is_host(actor) {
        return Err(ActionError::NotHost);
    }
    if record.players.len() != ROOM_SIZE {
        return Err(ActionError::WrongPlayerCount(record.players.len()));
    }

    let roles = assign_roles(&record.players, rng);
    Ok(ConditionalPatch::when(Phase::Lobby)
        .op(PatchOp::SetRoles(roles))
        .op(PatchOp::ClearRevealed)
        .op(PatchOp::SetPhase(Phase::Reveal)))
}

/// Reveal submission by the Raja or the Sipahi. Idempotent: the
/// union-append makes a resubmission a no-op, never an error.
pub fn submit_reveal(record: &RoomRecord, actor: &str) -> Result<ConditionalPatch, ActionError> {
    if record.phase != Phase::Reveal {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if !record.is_member(actor) {
        return Err(ActionError::NotAMember);
    }
    let role = record.role_of(actor).ok_or(ActionError::NotAMember)?;
    if !role.reveals() {
        return Err(ActionError::CannotReveal);
    }

    Ok(ConditionalPatch::when(Phase::Reveal).op(PatchOp::AddReveal(RevealEntry {
        id: actor.to_string(),
        role,
    })))
}

/// Reveal coordinator: once both reveal entries are present, any observer
/// may attempt `reveal -> guess`. The phase guard makes concurrent
/// attempts converge to one effective transition, and the patch stamps
/// the single authoritative guess deadline every client counts down from.
pub fn advance_to_guess(record: &RoomRecord, now_ms: u64) -> Option<ConditionalPatch> {
    if record.phase != Phase::Reveal || !record.reveal_complete() {
        return None;
    }
    Some(
        ConditionalPatch::when(Phase::Reveal)
            .op(PatchOp::SetGuessDeadline(now_ms + GUESS_TIMEOUT_MS))
            .op(PatchOp::SetPhase(Phase::Guess)),
    )
}

/// `guess -> roundResult` by explicit accusation. Sipahi only; the target
/// must hold Mantri or Chor, so the Raja and the guesser themselves are
/// never valid picks.
pub fn submit_guess(
    record: &RoomRecord,
    actor: &str,
    target_id: &str,
) -> Result<ConditionalPatch, ActionError> {
    if record.phase != Phase::Guess {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if !record.is_member(actor) {
        return Err(ActionError::NotAMember);
    }
    if record.role_of(actor) != Some(Role::Sipahi) {
        return Err(ActionError::NotSipahi);
    }

    let target = record
        .player(target_id)
        .ok_or_else(|| ActionError::UnknownTarget(target_id.to_string()))?;
    let target_role = record
        .role_of(target_id)
        .ok_or_else(|| ActionError::UnknownTarget(target_id.to_string()))?;
    if !target_role.guessable() {
        return Err(ActionError::InvalidTarget(target.name.clone()));
    }

    let sipahi_name = record.name_of(actor).unwrap_or(actor).to_string();
    let guess = GuessRecord {
        sipahi: sipahi_name,
        guessed: Some(target.name.clone()),
        correct: target_role == Role::Chor,
    };
    Ok(resolve_with(guess))
}

/// `guess -> roundResult` by deadline expiry. Any member may submit it
/// once the authoritative deadline has passed; the guard rejects every
/// attempt after the first resolution, explicit or timed out.
pub fn resolve_timeout(
    record: &RoomRecord,
    actor: &str,
    now_ms: u64,
) -> Result<ConditionalPatch, ActionError> {
    if record.phase != Phase::Guess {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if !record.is_member(actor) {
        return Err(ActionError::NotAMember);
    }
    match record.guess_deadline {
        Some(deadline) if now_ms >= deadline => {}
        _ => return Err(ActionError::DeadlineNotReached),
    }

    let sipahi = record
        .holder_of(Role::Sipahi)
        .and_then(|id| record.name_of(id))
        .unwrap_or_default()
        .to_string();
    let guess = GuessRecord {
        sipahi,
        guessed: None,
        correct: false,
    };
    Ok(resolve_with(guess))
}

fn resolve_with(guess: GuessRecord) -> ConditionalPatch {
    ConditionalPatch::when(Phase::Guess)
        .op(PatchOp::SetGuess(guess))
        .op(PatchOp::ClearGuessDeadline)
        .op(PatchOp::SetPhase(Phase::RoundResult))
}

/// `roundResult -> lobby`: any member may start the next round. Clears
/// the round state and nothing else; `players` and `host` are untouched.
pub fn next_round(record: &RoomRecord, actor: &str) -> Result<ConditionalPatch, ActionError> {
    if record.phase != Phase::RoundResult {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if !record.is_member(actor) {
        return Err(ActionError::NotAMember);
    }
    Ok(ConditionalPatch::when(Phase::RoundResult)
        .op(PatchOp::ClearRoles)
        .op(PatchOp::ClearRevealed)
        .op(PatchOp::ClearGuess)
        .op(PatchOp::ClearGuessDeadline)
        .op(PatchOp::SetPhase(Phase::Lobby)))
}

/// Host-only terminal transition. The store refuses all writes to a
/// completed room, so this is the point the room stops processing.
pub fn close_room(record: &RoomRecord, actor: &str) -> Result<ConditionalPatch, ActionError> {
    if record.phase == Phase::Completed {
        return Err(ActionError::WrongPhase(record.phase));
    }
    if !record.is_host(actor) {
        return Err(ActionError::NotHost);
    }
    Ok(ConditionalPatch::when(record.phase).op(PatchOp::SetPhase(Phase::Completed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::record::{Role, RoleEntry};

    fn lobby_of(n: usize) -> RoomRecord {
        let mut record = initial_record("ABCD12", "Alice", "a", 1_000).unwrap();
        let extras = [("b", "Bob"), ("c", "Cara"), ("d", "Dev")];
        for (id, name) in extras.iter().take(n - 1) {
            let patch = join_room(&record, id, name).unwrap().unwrap();
            patch.apply(&mut record).unwrap();
        }
        record
    }

    /// Four players, reveal phase, the fixed assignment used by the
    /// scenario tests: A=Chor, B=Raja, C=Sipahi, D=Mantri.
    fn reveal_phase() -> RoomRecord {
        let mut record = lobby_of(4);
        record.phase = Phase::Reveal;
        record.player_roles = vec![
            RoleEntry { id: "a".into(), role: Role::Chor },
            RoleEntry { id: "b".into(), role: Role::Raja },
            RoleEntry { id: "c".into(), role: Role::Sipahi },
            RoleEntry { id: "d".into(), role: Role::Mantri },
        ];
        record
    }

    fn guess_phase(now: u64) -> RoomRecord {
        let mut record = reveal_phase();
        for id in ["b", "c"] {
            submit_reveal(&record, id).unwrap().apply(&mut record).unwrap();
        }
        advance_to_guess(&record, now)
            .unwrap()
            .apply(&mut record)
            .unwrap();
        record
    }

    #[test]
    fn initial_record_validates_inputs() {
        assert_eq!(
            initial_record("ABCD12", "  ", "a", 0),
            Err(ActionError::EmptyName)
        );
        assert_eq!(
            initial_record("abc", "Alice", "a", 0),
            Err(ActionError::BadRoomCode)
        );
        let record = initial_record("ABCD12", " Alice ", "a", 7).unwrap();
        assert_eq!(record.host, "Alice");
        assert_eq!(record.players.len(), 1);
    }

    #[test]
    fn join_rejoin_is_a_local_noop() {
        let record = lobby_of(3);
        assert_eq!(join_room(&record, "b", "Bob"), Ok(None));
    }

    #[test]
    fn join_outside_lobby_rejected() {
        let record = reveal_phase();
        assert_eq!(
            join_room(&record, "e", "Eve"),
            Err(ActionError::WrongPhase(Phase::Reveal))
        );
        // An existing member re-syncing is still fine mid-round.
        assert_eq!(join_room(&record, "b", "Bob"), Ok(None));
    }

    #[test]
    fn join_full_room_rejected() {
        let record = lobby_of(4);
        assert_eq!(join_room(&record, "e", "Eve"), Err(ActionError::RoomFull));
    }

    #[test]
    fn start_requires_host_and_four_players() {
        let mut rng = rand::thread_rng();

        let record = lobby_of(3);
        assert_eq!(
            start_round(&record, "a", &mut rng),
            Err(ActionError::WrongPlayerCount(3))
        );

        let record = lobby_of(4);
        assert_eq!(start_round(&record, "b", &mut rng), Err(ActionError::NotHost));
    }

    #[test]
    fn start_assigns_roles_and_enters_reveal() {
        let mut rng = rand::thread_rng();
        let mut record = lobby_of(4);

        let patch = start_round(&record, "a", &mut rng).unwrap();
        patch.apply(&mut record).unwrap();

        assert_eq!(record.phase, Phase::Reveal);
        assert_eq!(record.player_roles.len(), 4);
        assert!(record.revealed.is_empty());
        assert!(record.invariants_hold());
    }

    #[test]
    fn start_rerolls_roles_each_round() {
        // Two starts from the same lobby draw independently; over 20
        // attempts at least one differs unless assignment is frozen.
        let mut rng = rand::thread_rng();
        let record = lobby_of(4);

        let first = start_round(&record, "a", &mut rng).unwrap();
        let differs = (0..20).any(|_| start_round(&record, "a", &mut rng).unwrap() != first);
        assert!(differs);
    }

    #[test]
    fn only_raja_and_sipahi_reveal() {
        let record = reveal_phase();
        assert!(submit_reveal(&record, "b").is_ok());
        assert!(submit_reveal(&record, "c").is_ok());
        assert_eq!(submit_reveal(&record, "a"), Err(ActionError::CannotReveal));
        assert_eq!(submit_reveal(&record, "d"), Err(ActionError::CannotReveal));
        assert_eq!(submit_reveal(&record, "zz"), Err(ActionError::NotAMember));
    }

    #[test]
    fn duplicate_reveal_never_duplicates_entries() {
        let mut record = reveal_phase();
        let patch = submit_reveal(&record, "b").unwrap();

        patch.apply(&mut record).unwrap();
        patch.apply(&mut record).unwrap();
        submit_reveal(&record, "c").unwrap().apply(&mut record).unwrap();

        assert_eq!(record.revealed.len(), 2);
    }

    #[test]
    fn coordinator_waits_for_both_reveals() {
        let mut record = reveal_phase();
        assert!(advance_to_guess(&record, 5_000).is_none());

        submit_reveal(&record, "b").unwrap().apply(&mut record).unwrap();
        assert!(advance_to_guess(&record, 5_000).is_none());

        submit_reveal(&record, "c").unwrap().apply(&mut record).unwrap();
        let patch = advance_to_guess(&record, 5_000).unwrap();
        patch.apply(&mut record).unwrap();

        assert_eq!(record.phase, Phase::Guess);
        assert_eq!(record.guess_deadline, Some(5_000 + GUESS_TIMEOUT_MS));
        assert!(record.invariants_hold());
    }

    #[test]
    fn concurrent_advance_attempts_collapse_to_one() {
        let mut record = reveal_phase();
        for id in ["b", "c"] {
            submit_reveal(&record, id).unwrap().apply(&mut record).unwrap();
        }

        // Both qualifying clients observe the completed set and race.
        let from_raja = advance_to_guess(&record, 5_000).unwrap();
        let from_sipahi = advance_to_guess(&record, 5_200).unwrap();

        from_raja.apply(&mut record).unwrap();
        assert!(matches!(
            from_sipahi.apply(&mut record),
            Err(StoreError::InvalidTransition { .. })
        ));
        // A second attempt from the winner is also absorbed.
        assert!(from_raja.apply(&mut record).is_err());

        assert_eq!(record.phase, Phase::Guess);
        assert_eq!(record.guess_deadline, Some(5_000 + GUESS_TIMEOUT_MS));
    }

    #[test]
    fn guess_restricted_to_sipahi_and_valid_targets() {
        let record = guess_phase(5_000);

        assert_eq!(submit_guess(&record, "b", "a"), Err(ActionError::NotSipahi));
        assert_eq!(
            submit_guess(&record, "c", "b"),
            Err(ActionError::InvalidTarget("Bob".to_string()))
        );
        assert_eq!(
            submit_guess(&record, "c", "c"),
            Err(ActionError::InvalidTarget("Cara".to_string()))
        );
        assert_eq!(
            submit_guess(&record, "c", "nope"),
            Err(ActionError::UnknownTarget("nope".to_string()))
        );
    }

    #[test]
    fn correct_guess_names_the_chor() {
        // Players A,B,C,D joined in order; A=Chor, C=Sipahi. C accuses A.
        let mut record = guess_phase(5_000);

        let patch = submit_guess(&record, "c", "a").unwrap();
        patch.apply(&mut record).unwrap();

        assert_eq!(record.phase, Phase::RoundResult);
        assert_eq!(
            record.guess,
            Some(GuessRecord {
                sipahi: "Cara".to_string(),
                guessed: Some("Alice".to_string()),
                correct: true,
            })
        );
        assert_eq!(record.guess_deadline, None);
        assert!(record.invariants_hold());
    }

    #[test]
    fn wrong_guess_is_recorded_as_incorrect() {
        let mut record = guess_phase(5_000);
        submit_guess(&record, "c", "d").unwrap().apply(&mut record).unwrap();

        let guess = record.guess.unwrap();
        assert_eq!(guess.guessed, Some("Dev".to_string()));
        assert!(!guess.correct);
    }

    #[test]
    fn timeout_requires_the_deadline_to_pass() {
        let record = guess_phase(5_000);
        let deadline = record.guess_deadline.unwrap();

        assert_eq!(
            resolve_timeout(&record, "a", deadline - 1),
            Err(ActionError::DeadlineNotReached)
        );
        assert!(resolve_timeout(&record, "a", deadline).is_ok());
    }

    #[test]
    fn timeout_resolves_with_null_guess() {
        let mut record = guess_phase(5_000);
        let deadline = record.guess_deadline.unwrap();

        let patch = resolve_timeout(&record, "d", deadline + 1).unwrap();
        patch.apply(&mut record).unwrap();

        assert_eq!(record.phase, Phase::RoundResult);
        assert_eq!(
            record.guess,
            Some(GuessRecord {
                sipahi: "Cara".to_string(),
                guessed: None,
                correct: false,
            })
        );
        assert!(record.invariants_hold());
    }

    #[test]
    fn guess_and_timeout_race_resolves_once() {
        let mut record = guess_phase(5_000);
        let deadline = record.guess_deadline.unwrap();

        // One client guesses at the buzzer while another's deadline fires.
        let explicit = submit_guess(&record, "c", "a").unwrap();
        let timed_out = resolve_timeout(&record, "b", deadline).unwrap();

        explicit.apply(&mut record).unwrap();
        assert!(matches!(
            timed_out.apply(&mut record),
            Err(StoreError::InvalidTransition { .. })
        ));

        assert!(record.guess.as_ref().unwrap().correct);
    }

    #[test]
    fn next_round_clears_round_state_only() {
        let mut record = guess_phase(5_000);
        submit_guess(&record, "c", "a").unwrap().apply(&mut record).unwrap();
        let players_before = record.players.clone();

        let patch = next_round(&record, "d").unwrap();
        patch.apply(&mut record).unwrap();

        assert_eq!(record.phase, Phase::Lobby);
        assert!(record.player_roles.is_empty());
        assert!(record.revealed.is_empty());
        assert!(record.guess.is_none());
        assert!(record.guess_deadline.is_none());
        assert_eq!(record.players, players_before);
        assert_eq!(record.host, "Alice");
        assert!(record.invariants_hold());
    }

    #[test]
    fn next_round_outside_round_result_rejected() {
        let record = lobby_of(4);
        assert_eq!(
            next_round(&record, "a"),
            Err(ActionError::WrongPhase(Phase::Lobby))
        );
    }

    #[test]
    fn rounds_repeat_indefinitely_with_the_same_players() {
        let mut rng = rand::thread_rng();
        let mut record = lobby_of(4);

        for _ in 0..5 {
            start_round(&record, "a", &mut rng).unwrap().apply(&mut record).unwrap();
            assert!(record.invariants_hold());

            let raja = record.holder_of(Role::Raja).unwrap().to_string();
            let sipahi = record.holder_of(Role::Sipahi).unwrap().to_string();
            let chor = record.holder_of(Role::Chor).unwrap().to_string();

            submit_reveal(&record, &raja).unwrap().apply(&mut record).unwrap();
            submit_reveal(&record, &sipahi).unwrap().apply(&mut record).unwrap();
            advance_to_guess(&record, 1_000).unwrap().apply(&mut record).unwrap();
            assert!(record.invariants_hold());

            submit_guess(&record, &sipahi, &chor).unwrap().apply(&mut record).unwrap();
            assert!(record.guess.as_ref().unwrap().correct);
            assert!(record.invariants_hold());

            next_round(&record, &sipahi).unwrap().apply(&mut record).unwrap();
            assert!(record.invariants_hold());
            assert_eq!(record.players.len(), 4);
        }
    }

    #[test]
    fn close_room_is_terminal() {
        let mut record = lobby_of(4);
        assert_eq!(close_room(&record, "b"), Err(ActionError::NotHost));

        close_room(&record, "a").unwrap().apply(&mut record).unwrap();
        assert_eq!(record.phase, Phase::Completed);

        // Nothing moves a completed room.
        let mut rng = rand::thread_rng();
        assert!(start_round(&record, "a", &mut rng).is_err());
        assert!(matches!(
            ConditionalPatch::unconditional()
                .op(PatchOp::SetPhase(Phase::Lobby))
                .apply(&mut record),
            Err(StoreError::RoomClosed(_))
        ));
    }
}
