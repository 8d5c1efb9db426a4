// Team membership reconciliation and the capacity guard.
//
// A user's membership rows are only ever created or destroyed here. The
// caller supplies, per team kind, either nothing (leave that kind alone) or a
// full target list of team tokens; the difference against the current rows is
// computed and applied as one atomic unit. Capacity is checked for every team
// the user would newly join, while the team row is locked, before any row is
// written.
use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashSet;
use thiserror::Error;

use crate::database::models::TeamSummary;
use crate::token::{EntityKind, IdCodec};

/// The two membership kinds, reconciled independently but committed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamKind {
    Development,
    Testing,
}

impl TeamKind {
    pub fn entity_kind(self) -> EntityKind {
        match self {
            TeamKind::Development => EntityKind::DevelopmentTeam,
            TeamKind::Testing => EntityKind::TestingTeam,
        }
    }

    /// Request field the kind's tokens arrive in; capacity errors are
    /// attributed back to it.
    pub fn field(self) -> &'static str {
        match self {
            TeamKind::Development => "development_team_ids",
            TeamKind::Testing => "testing_team_ids",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TeamKind::Development => "Development team",
            TeamKind::Testing => "Testing team",
        }
    }

    pub fn team_table(self) -> &'static str {
        match self {
            TeamKind::Development => "development_teams",
            TeamKind::Testing => "testing_teams",
        }
    }

    pub fn pivot_table(self) -> &'static str {
        match self {
            TeamKind::Development => "development_team_user",
            TeamKind::Testing => "testing_team_user",
        }
    }

    /// Primary-key column of the team table; the pivot uses the same name.
    pub fn id_column(self) -> &'static str {
        match self {
            TeamKind::Development => "team_id",
            TeamKind::Testing => "testing_team_id",
        }
    }
}

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("invalid identifier token in {field}")]
    InvalidToken { field: &'static str },

    #[error("team {team_id} referenced by {field} does not exist")]
    TeamNotFound { field: &'static str, team_id: i64 },

    #[error("{team_label} '{team_name}' has reached its maximum size of {team_size} members")]
    CapacityExceeded {
        field: &'static str,
        team_label: &'static str,
        team_name: String,
        team_size: i32,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Requested membership state, one slot per team kind.
///
/// `None` means "do not touch this kind"; `Some(vec![])` means "detach all".
/// The two are not equivalent and are kept distinct all the way from the
/// request body (serde `Option`) down to here.
#[derive(Debug, Default, Clone)]
pub struct TeamChanges {
    pub development: Option<Vec<String>>,
    pub testing: Option<Vec<String>>,
}

impl TeamChanges {
    fn requested(&self, kind: TeamKind) -> Option<&[String]> {
        match kind {
            TeamKind::Development => self.development.as_deref(),
            TeamKind::Testing => self.testing.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.development.is_none() && self.testing.is_none()
    }
}

/// Set difference between current and requested memberships.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MembershipPlan {
    pub to_add: Vec<i64>,
    pub to_remove: Vec<i64>,
}

impl MembershipPlan {
    pub fn diff(current: &HashSet<i64>, target: &HashSet<i64>) -> Self {
        let mut to_add: Vec<i64> = target.difference(current).copied().collect();
        let mut to_remove: Vec<i64> = current.difference(target).copied().collect();
        // Deterministic order keeps lock acquisition stable across requests
        to_add.sort_unstable();
        to_remove.sort_unstable();
        Self { to_add, to_remove }
    }

    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Equality counts as full: a team at `team_size` members accepts no one.
pub fn team_is_full(member_count: i64, team_size: i32) -> bool {
    member_count >= i64::from(team_size)
}

/// Storage seam for reconciliation. The Postgres implementation runs inside
/// the caller's transaction; tests use an in-memory double.
#[async_trait]
pub trait MembershipStore: Send {
    async fn current_teams(
        &mut self,
        user_id: i64,
        kind: TeamKind,
    ) -> Result<HashSet<i64>, AssignmentError>;

    /// Fetch the team row, holding it against concurrent membership writes
    /// for the remainder of the unit of work.
    async fn lock_team(
        &mut self,
        kind: TeamKind,
        team_id: i64,
    ) -> Result<Option<TeamSummary>, AssignmentError>;

    async fn member_count(&mut self, kind: TeamKind, team_id: i64)
        -> Result<i64, AssignmentError>;

    async fn detach(
        &mut self,
        user_id: i64,
        kind: TeamKind,
        team_ids: &[i64],
    ) -> Result<(), AssignmentError>;

    async fn attach(
        &mut self,
        user_id: i64,
        kind: TeamKind,
        team_ids: &[i64],
    ) -> Result<(), AssignmentError>;
}

fn decode_targets(
    codec: &IdCodec,
    kind: TeamKind,
    tokens: &[String],
) -> Result<HashSet<i64>, AssignmentError> {
    let mut ids = HashSet::with_capacity(tokens.len());
    for token in tokens {
        let id = codec
            .decode(kind.entity_kind(), token)
            .map_err(|_| AssignmentError::InvalidToken { field: kind.field() })?;
        ids.insert(id);
    }
    Ok(ids)
}

/// Make the persisted membership sets match `changes` for the given user.
///
/// Order of operations, for both kinds together:
/// 1. decode every token (any failure aborts before anything is read),
/// 2. diff against current rows,
/// 3. capacity-check every `to_add` team under its row lock,
/// 4. apply removals then additions.
///
/// Teams the user already belongs to are never re-checked; a no-op
/// resubmission of a full team's list succeeds. Nothing is written until
/// every check has passed, so a failure anywhere leaves both kinds untouched
/// (the caller's transaction handles write-phase failures).
pub async fn reconcile<S: MembershipStore>(
    store: &mut S,
    codec: &IdCodec,
    user_id: i64,
    changes: &TeamChanges,
) -> Result<(), AssignmentError> {
    const KINDS: [TeamKind; 2] = [TeamKind::Development, TeamKind::Testing];

    let mut targets: Vec<(TeamKind, HashSet<i64>)> = Vec::new();
    for kind in KINDS {
        if let Some(tokens) = changes.requested(kind) {
            targets.push((kind, decode_targets(codec, kind, tokens)?));
        }
    }

    let mut plans: Vec<(TeamKind, MembershipPlan)> = Vec::new();
    for (kind, target) in &targets {
        let current = store.current_teams(user_id, *kind).await?;
        plans.push((*kind, MembershipPlan::diff(&current, target)));
    }

    for (kind, plan) in &plans {
        for &team_id in &plan.to_add {
            let team = store.lock_team(*kind, team_id).await?.ok_or(
                AssignmentError::TeamNotFound { field: kind.field(), team_id },
            )?;
            let count = store.member_count(*kind, team_id).await?;
            if team_is_full(count, team.team_size) {
                return Err(AssignmentError::CapacityExceeded {
                    field: kind.field(),
                    team_label: kind.label(),
                    team_name: team.team_name,
                    team_size: team.team_size,
                });
            }
        }
    }

    for (kind, plan) in &plans {
        if !plan.to_remove.is_empty() {
            store.detach(user_id, *kind, &plan.to_remove).await?;
        }
        if !plan.to_add.is_empty() {
            store.attach(user_id, *kind, &plan.to_add).await?;
        }
    }

    Ok(())
}

/// `MembershipStore` over a live Postgres connection. Callers wrap it in a
/// transaction together with whatever user-row write triggered the
/// reconciliation; `lock_team` issues `FOR UPDATE` so the count-then-insert
/// sequence is serialized per team.
pub struct PgMembershipStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgMembershipStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MembershipStore for PgMembershipStore<'_> {
    async fn current_teams(
        &mut self,
        user_id: i64,
        kind: TeamKind,
    ) -> Result<HashSet<i64>, AssignmentError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1",
            kind.id_column(),
            kind.pivot_table()
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn lock_team(
        &mut self,
        kind: TeamKind,
        team_id: i64,
    ) -> Result<Option<TeamSummary>, AssignmentError> {
        let sql = format!(
            "SELECT {id} AS team_id, team_name, team_size FROM {table} WHERE {id} = $1 FOR UPDATE",
            id = kind.id_column(),
            table = kind.team_table()
        );
        let team = sqlx::query_as::<_, TeamSummary>(&sql)
            .bind(team_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(team)
    }

    async fn member_count(
        &mut self,
        kind: TeamKind,
        team_id: i64,
    ) -> Result<i64, AssignmentError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = $1",
            kind.pivot_table(),
            kind.id_column()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(team_id)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }

    async fn detach(
        &mut self,
        user_id: i64,
        kind: TeamKind,
        team_ids: &[i64],
    ) -> Result<(), AssignmentError> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND {} = ANY($2)",
            kind.pivot_table(),
            kind.id_column()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(team_ids)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn attach(
        &mut self,
        user_id: i64,
        kind: TeamKind,
        team_ids: &[i64],
    ) -> Result<(), AssignmentError> {
        let sql = format!(
            "INSERT INTO {} (user_id, {}) SELECT $1, unnest($2::bigint[])",
            kind.pivot_table(),
            kind.id_column()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(team_ids)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::IdCodec;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// In-memory store mirroring the pivot tables, for exercising the
    /// reconciliation semantics without a database.
    #[derive(Default)]
    struct MemoryStore {
        teams: HashMap<(TeamKind, i64), TeamSummary>,
        members: HashMap<(TeamKind, i64), HashSet<i64>>,
    }

    impl MemoryStore {
        fn with_team(mut self, kind: TeamKind, id: i64, name: &str, size: i32) -> Self {
            self.teams.insert(
                (kind, id),
                TeamSummary { team_id: id, team_name: name.to_string(), team_size: size },
            );
            self.members.entry((kind, id)).or_default();
            self
        }

        fn with_member(mut self, kind: TeamKind, team_id: i64, user_id: i64) -> Self {
            self.members.entry((kind, team_id)).or_default().insert(user_id);
            self
        }

        fn teams_of(&self, kind: TeamKind, user_id: i64) -> HashSet<i64> {
            self.members
                .iter()
                .filter(|((k, _), users)| *k == kind && users.contains(&user_id))
                .map(|((_, team_id), _)| *team_id)
                .collect()
        }

        fn count(&self, kind: TeamKind, team_id: i64) -> usize {
            self.members.get(&(kind, team_id)).map_or(0, HashSet::len)
        }
    }

    #[async_trait]
    impl MembershipStore for MemoryStore {
        async fn current_teams(
            &mut self,
            user_id: i64,
            kind: TeamKind,
        ) -> Result<HashSet<i64>, AssignmentError> {
            Ok(self.teams_of(kind, user_id))
        }

        async fn lock_team(
            &mut self,
            kind: TeamKind,
            team_id: i64,
        ) -> Result<Option<TeamSummary>, AssignmentError> {
            Ok(self.teams.get(&(kind, team_id)).cloned())
        }

        async fn member_count(
            &mut self,
            kind: TeamKind,
            team_id: i64,
        ) -> Result<i64, AssignmentError> {
            Ok(self.count(kind, team_id) as i64)
        }

        async fn detach(
            &mut self,
            user_id: i64,
            kind: TeamKind,
            team_ids: &[i64],
        ) -> Result<(), AssignmentError> {
            for id in team_ids {
                if let Some(users) = self.members.get_mut(&(kind, *id)) {
                    users.remove(&user_id);
                }
            }
            Ok(())
        }

        async fn attach(
            &mut self,
            user_id: i64,
            kind: TeamKind,
            team_ids: &[i64],
        ) -> Result<(), AssignmentError> {
            for id in team_ids {
                self.members.entry((kind, *id)).or_default().insert(user_id);
            }
            Ok(())
        }
    }

    fn codec() -> IdCodec {
        IdCodec::from_secret("assignment-tests")
    }

    fn tokens(kind: TeamKind, ids: &[i64]) -> Vec<String> {
        let c = codec();
        ids.iter().map(|id| c.encode(kind.entity_kind(), *id)).collect()
    }

    #[test]
    fn diff_computes_set_difference() {
        let current: HashSet<i64> = [1, 2, 3].into();
        let target: HashSet<i64> = [2, 3, 4].into();
        let plan = MembershipPlan::diff(&current, &target);
        assert_eq!(plan.to_add, vec![4]);
        assert_eq!(plan.to_remove, vec![1]);
    }

    #[test]
    fn diff_of_identical_sets_is_noop() {
        let s: HashSet<i64> = [5, 6].into();
        assert!(MembershipPlan::diff(&s, &s).is_noop());
    }

    #[test]
    fn equality_counts_as_full() {
        assert!(!team_is_full(1, 2));
        assert!(team_is_full(2, 2));
        assert!(team_is_full(3, 2));
    }

    #[tokio::test]
    async fn fills_a_team_up_to_capacity_and_no_further() {
        let mut store = MemoryStore::default().with_team(TeamKind::Development, 1, "Core", 2);
        let c = codec();
        let changes = TeamChanges {
            development: Some(tokens(TeamKind::Development, &[1])),
            testing: None,
        };

        reconcile(&mut store, &c, 100, &changes).await.unwrap();
        reconcile(&mut store, &c, 101, &changes).await.unwrap();

        let err = reconcile(&mut store, &c, 102, &changes).await.unwrap_err();
        assert!(matches!(
            err,
            AssignmentError::CapacityExceeded { field: "development_team_ids", team_size: 2, .. }
        ));
        assert_eq!(store.count(TeamKind::Development, 1), 2);
    }

    #[tokio::test]
    async fn rejected_reassignment_leaves_existing_membership_intact() {
        // User 7 sits in team A; team B is full (size 1, occupied by user 8)
        let mut store = MemoryStore::default()
            .with_team(TeamKind::Development, 1, "Team A", 3)
            .with_team(TeamKind::Development, 2, "Team B", 1)
            .with_member(TeamKind::Development, 1, 7)
            .with_member(TeamKind::Development, 2, 8);
        let c = codec();

        let changes = TeamChanges {
            development: Some(tokens(TeamKind::Development, &[2])),
            testing: None,
        };
        let err = reconcile(&mut store, &c, 7, &changes).await.unwrap_err();
        assert!(matches!(err, AssignmentError::CapacityExceeded { .. }));

        // No partial detach: still in A, not in B
        assert_eq!(store.teams_of(TeamKind::Development, 7), HashSet::from([1]));
    }

    #[tokio::test]
    async fn empty_list_detaches_all_and_omitted_kind_is_untouched() {
        let mut store = MemoryStore::default()
            .with_team(TeamKind::Development, 1, "Dev", 5)
            .with_team(TeamKind::Testing, 1, "QA", 5)
            .with_member(TeamKind::Development, 1, 9)
            .with_member(TeamKind::Testing, 1, 9);
        let c = codec();

        let changes = TeamChanges { development: None, testing: Some(vec![]) };
        reconcile(&mut store, &c, 9, &changes).await.unwrap();

        assert!(store.teams_of(TeamKind::Testing, 9).is_empty());
        assert_eq!(store.teams_of(TeamKind::Development, 9), HashSet::from([1]));
    }

    #[tokio::test]
    async fn noop_resubmission_of_a_full_team_succeeds() {
        // Open question resolved: teams the user already belongs to are not
        // re-validated against capacity.
        let mut store = MemoryStore::default()
            .with_team(TeamKind::Development, 1, "Full", 1)
            .with_member(TeamKind::Development, 1, 3);
        let c = codec();

        let changes = TeamChanges {
            development: Some(tokens(TeamKind::Development, &[1])),
            testing: None,
        };
        reconcile(&mut store, &c, 3, &changes).await.unwrap();
        assert_eq!(store.count(TeamKind::Development, 1), 1);
    }

    #[tokio::test]
    async fn capacity_failure_in_one_kind_aborts_both_kinds() {
        let mut store = MemoryStore::default()
            .with_team(TeamKind::Development, 1, "Dev", 5)
            .with_team(TeamKind::Testing, 1, "QA", 1)
            .with_member(TeamKind::Testing, 1, 50);
        let c = codec();

        let changes = TeamChanges {
            development: Some(tokens(TeamKind::Development, &[1])),
            testing: Some(tokens(TeamKind::Testing, &[1])),
        };
        let err = reconcile(&mut store, &c, 60, &changes).await.unwrap_err();
        assert!(matches!(err, AssignmentError::CapacityExceeded { field: "testing_team_ids", .. }));

        // The valid development addition must not have been applied
        assert!(store.teams_of(TeamKind::Development, 60).is_empty());
    }

    #[tokio::test]
    async fn any_invalid_token_aborts_the_whole_request() {
        let mut store = MemoryStore::default()
            .with_team(TeamKind::Development, 1, "Dev", 5)
            .with_member(TeamKind::Development, 1, 4);
        let c = codec();

        let mut dev = tokens(TeamKind::Development, &[1]);
        dev.push("garbage-token".to_string());
        let changes = TeamChanges { development: Some(dev), testing: Some(vec![]) };

        let err = reconcile(&mut store, &c, 4, &changes).await.unwrap_err();
        assert!(matches!(err, AssignmentError::InvalidToken { field: "development_team_ids" }));
        assert_eq!(store.teams_of(TeamKind::Development, 4), HashSet::from([1]));
    }

    #[tokio::test]
    async fn cross_kind_tokens_are_rejected() {
        let mut store = MemoryStore::default().with_team(TeamKind::Development, 1, "Dev", 5);
        let c = codec();

        // A testing-team token smuggled into the development list
        let changes = TeamChanges {
            development: Some(tokens(TeamKind::Testing, &[1])),
            testing: None,
        };
        let err = reconcile(&mut store, &c, 2, &changes).await.unwrap_err();
        assert!(matches!(err, AssignmentError::InvalidToken { field: "development_team_ids" }));
    }

    #[tokio::test]
    async fn concurrent_requests_fill_exactly_one_last_slot() {
        // The store mutex stands in for the per-team row lock the Postgres
        // implementation takes with FOR UPDATE.
        let store = Arc::new(Mutex::new(
            MemoryStore::default().with_team(TeamKind::Development, 1, "Last Slot", 1),
        ));
        let c = Arc::new(codec());

        let mut handles = Vec::new();
        for user_id in [201i64, 202] {
            let store = Arc::clone(&store);
            let c = Arc::clone(&c);
            handles.push(tokio::spawn(async move {
                let changes = TeamChanges {
                    development: Some(vec![c.encode(EntityKind::DevelopmentTeam, 1)]),
                    testing: None,
                };
                let mut guard = store.lock().await;
                reconcile(&mut *guard, &c, user_id, &changes).await
            }));
        }

        let mut successes = 0;
        let mut capacity_failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(AssignmentError::CapacityExceeded { .. }) => capacity_failures += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(capacity_failures, 1);
        assert_eq!(store.lock().await.count(TeamKind::Development, 1), 1);
    }
}
