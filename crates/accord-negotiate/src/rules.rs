//! Pairwise conflict-resolution table.
//!
//! For every subtask, the receiver classifies who the sender believes holds
//! it and who it believes holds it itself, looks the pair up in [`rule`], and
//! resolves the resulting [`Rule`] against bids and round stamps.
//!
//! | Peer believes | Local: receiver | Local: sender | Local: other | Local: nobody |
//! |---|---|---|---|---|
//! | sender   | update if higher    | update            | update if newer or higher | update |
//! | receiver | leave               | reset             | reset if newer            | leave  |
//! | other    | update if newer and higher | update if newer, else reset | same other: update if newer; different: update if newer and higher | update if newer |
//! | nobody   | leave               | update            | update if newer           | leave  |
//!
//! An exact bid tie between receiver and sender goes to the lower agent id.

use accord_core::{AgentId, Winner};
use accord_state::SubtaskRecord;

/// Holder of a subtask as seen from one side of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The agent applying the rules.
    Receiver,
    /// The agent whose snapshot is being applied.
    Sender,
    /// Some third agent.
    Other,
    /// No holder.
    Nobody,
}

impl Owner {
    pub fn classify(winner: Winner, receiver: AgentId, sender: AgentId) -> Self {
        match winner {
            Winner::None => Owner::Nobody,
            Winner::Agent(id) if id == receiver => Owner::Receiver,
            Winner::Agent(id) if id == sender => Owner::Sender,
            Winner::Agent(_) => Owner::Other,
        }
    }
}

/// Entry of the rule table, before bids and stamps are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Update,
    Reset,
    Leave,
    UpdateIfHigher,
    UpdateIfNewer,
    UpdateIfNewerOrHigher,
    UpdateIfNewerAndHigher,
    ResetIfNewer,
    UpdateIfNewerElseReset,
}

/// What the receiver does with its record of one subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Adopt the sender's record.
    Update,
    /// Clear the record.
    Reset,
    /// Keep the record.
    Leave,
}

/// Look up the table entry for `(peer, local)`.
///
/// `same_other` distinguishes two beliefs in the same third agent from two
/// different third agents and is ignored otherwise.
pub fn rule(peer: Owner, local: Owner, same_other: bool) -> Rule {
    use Owner::*;

    match (peer, local) {
        (Sender, Receiver) => Rule::UpdateIfHigher,
        (Sender, Sender) => Rule::Update,
        (Sender, Other) => Rule::UpdateIfNewerOrHigher,
        (Sender, Nobody) => Rule::Update,

        (Receiver, Receiver) => Rule::Leave,
        (Receiver, Sender) => Rule::Reset,
        (Receiver, Other) => Rule::ResetIfNewer,
        (Receiver, Nobody) => Rule::Leave,

        (Other, Receiver) => Rule::UpdateIfNewerAndHigher,
        (Other, Sender) => Rule::UpdateIfNewerElseReset,
        (Other, Other) if same_other => Rule::UpdateIfNewer,
        (Other, Other) => Rule::UpdateIfNewerAndHigher,
        (Other, Nobody) => Rule::UpdateIfNewer,

        (Nobody, Receiver) => Rule::Leave,
        (Nobody, Sender) => Rule::Update,
        (Nobody, Other) => Rule::UpdateIfNewer,
        (Nobody, Nobody) => Rule::Leave,
    }
}

impl Rule {
    /// Resolve against the two records.
    pub fn resolve(
        self,
        peer: &SubtaskRecord,
        local: &SubtaskRecord,
        receiver: AgentId,
        sender: AgentId,
    ) -> Action {
        let newer = peer.stamp > local.stamp;
        let higher = peer.bid > local.bid;
        let when = |cond: bool| if cond { Action::Update } else { Action::Leave };

        match self {
            Rule::Update => Action::Update,
            Rule::Reset => Action::Reset,
            Rule::Leave => Action::Leave,
            Rule::UpdateIfHigher => when(higher || (peer.bid == local.bid && sender < receiver)),
            Rule::UpdateIfNewer => when(newer),
            Rule::UpdateIfNewerOrHigher => when(newer || higher),
            Rule::UpdateIfNewerAndHigher => when(newer && higher),
            Rule::ResetIfNewer => {
                if newer {
                    Action::Reset
                } else {
                    Action::Leave
                }
            }
            Rule::UpdateIfNewerElseReset => {
                if newer {
                    Action::Update
                } else {
                    Action::Reset
                }
            }
        }
    }
}

/// Decide what `receiver` does with its record of a subtask given `sender`'s.
pub fn decide(
    receiver: AgentId,
    sender: AgentId,
    local: &SubtaskRecord,
    peer: &SubtaskRecord,
) -> Action {
    let peer_owner = Owner::classify(peer.winner, receiver, sender);
    let local_owner = Owner::classify(local.winner, receiver, sender);
    rule(peer_owner, local_owner, peer.winner == local.winner).resolve(peer, local, receiver, sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_core::SubtaskId;
    use proptest::prelude::*;

    fn record(winner: Winner, bid: f64, stamp: u64) -> SubtaskRecord {
        SubtaskRecord {
            subtask: SubtaskId(0),
            bid,
            winner,
            arrival: 0.0,
            stamp,
        }
    }

    struct Parties {
        me: AgentId,
        sender: AgentId,
        m: AgentId,
        n: AgentId,
    }

    impl Parties {
        fn new() -> Self {
            let mut ids: Vec<AgentId> = (0..4).map(|_| AgentId::new()).collect();
            ids.sort();
            // Receiver gets the highest id so exact ties go to the sender.
            Self {
                me: ids[3],
                sender: ids[0],
                m: ids[1],
                n: ids[2],
            }
        }

        fn decide(&self, local: SubtaskRecord, peer: SubtaskRecord) -> Action {
            decide(self.me, self.sender, &local, &peer)
        }
    }

    #[test]
    fn test_table_is_exhaustive() {
        use Owner::*;
        let owners = [Receiver, Sender, Other, Nobody];
        for peer in owners {
            for local in owners {
                // Every pair has an entry; the match is total.
                let _ = rule(peer, local, false);
                let _ = rule(peer, local, true);
            }
        }
        assert_eq!(rule(Other, Other, true), Rule::UpdateIfNewer);
        assert_eq!(rule(Other, Other, false), Rule::UpdateIfNewerAndHigher);
    }

    #[test]
    fn test_sender_claims() {
        let p = Parties::new();
        let s = Winner::Agent(p.sender);
        let me = Winner::Agent(p.me);
        let m = Winner::Agent(p.m);

        // local: receiver
        assert_eq!(p.decide(record(me, 10.0, 1), record(s, 11.0, 1)), Action::Update);
        assert_eq!(p.decide(record(me, 10.0, 1), record(s, 9.0, 5)), Action::Leave);
        assert_eq!(p.decide(record(me, 10.0, 1), record(s, 10.0, 1)), Action::Update);
        // local: sender
        assert_eq!(p.decide(record(s, 10.0, 3), record(s, 8.0, 1)), Action::Update);
        // local: other
        assert_eq!(p.decide(record(m, 10.0, 1), record(s, 9.0, 2)), Action::Update);
        assert_eq!(p.decide(record(m, 10.0, 2), record(s, 11.0, 1)), Action::Update);
        assert_eq!(p.decide(record(m, 10.0, 2), record(s, 9.0, 2)), Action::Leave);
        // local: nobody
        assert_eq!(p.decide(record(Winner::None, 0.0, 4), record(s, 1.0, 1)), Action::Update);
    }

    #[test]
    fn test_receiver_claims() {
        let p = Parties::new();
        let s = Winner::Agent(p.sender);
        let me = Winner::Agent(p.me);
        let m = Winner::Agent(p.m);

        assert_eq!(p.decide(record(me, 10.0, 1), record(me, 10.0, 1)), Action::Leave);
        assert_eq!(p.decide(record(s, 10.0, 1), record(me, 10.0, 1)), Action::Reset);
        assert_eq!(p.decide(record(m, 10.0, 1), record(me, 10.0, 2)), Action::Reset);
        assert_eq!(p.decide(record(m, 10.0, 2), record(me, 10.0, 2)), Action::Leave);
        assert_eq!(p.decide(record(Winner::None, 0.0, 1), record(me, 10.0, 2)), Action::Leave);
    }

    #[test]
    fn test_third_party_claims() {
        let p = Parties::new();
        let s = Winner::Agent(p.sender);
        let me = Winner::Agent(p.me);
        let m = Winner::Agent(p.m);
        let n = Winner::Agent(p.n);

        // local: receiver
        assert_eq!(p.decide(record(me, 10.0, 1), record(m, 12.0, 2)), Action::Update);
        assert_eq!(p.decide(record(me, 10.0, 1), record(m, 9.0, 2)), Action::Leave);
        assert_eq!(p.decide(record(me, 10.0, 2), record(m, 12.0, 2)), Action::Leave);
        // local: sender
        assert_eq!(p.decide(record(s, 10.0, 1), record(m, 5.0, 2)), Action::Update);
        assert_eq!(p.decide(record(s, 10.0, 2), record(m, 15.0, 2)), Action::Reset);
        // local: same third party
        assert_eq!(p.decide(record(m, 10.0, 1), record(m, 8.0, 2)), Action::Update);
        assert_eq!(p.decide(record(m, 10.0, 2), record(m, 12.0, 2)), Action::Leave);
        // local: different third party
        assert_eq!(p.decide(record(n, 10.0, 1), record(m, 12.0, 2)), Action::Update);
        assert_eq!(p.decide(record(n, 10.0, 1), record(m, 8.0, 2)), Action::Leave);
        // local: nobody
        assert_eq!(p.decide(record(Winner::None, 0.0, 1), record(m, 8.0, 2)), Action::Update);
        assert_eq!(p.decide(record(Winner::None, 0.0, 3), record(m, 8.0, 2)), Action::Leave);
    }

    #[test]
    fn test_nobody_claims() {
        let p = Parties::new();
        let s = Winner::Agent(p.sender);
        let me = Winner::Agent(p.me);
        let m = Winner::Agent(p.m);
        let none = Winner::None;

        assert_eq!(p.decide(record(me, 10.0, 1), record(none, 0.0, 5)), Action::Leave);
        assert_eq!(p.decide(record(s, 10.0, 1), record(none, 0.0, 2)), Action::Update);
        assert_eq!(p.decide(record(m, 10.0, 1), record(none, 0.0, 2)), Action::Update);
        assert_eq!(p.decide(record(m, 10.0, 2), record(none, 0.0, 2)), Action::Leave);
        assert_eq!(p.decide(record(none, 0.0, 0), record(none, 0.0, 2)), Action::Leave);
    }

    #[test]
    fn test_exact_tie_resolves_consistently() {
        let a = AgentId::new();
        let b = AgentId::new();

        // Each agent believes itself the winner at the same bid.
        let a_view = record(Winner::Agent(a), 10.0, 1);
        let b_view = record(Winner::Agent(b), 10.0, 1);
        let a_action = decide(a, b, &a_view, &b_view);
        let b_action = decide(b, a, &b_view, &a_view);

        let updates = [a_action, b_action]
            .iter()
            .filter(|&&action| action == Action::Update)
            .count();
        assert_eq!(updates, 1);
        assert_eq!(a_action == Action::Leave, a < b);
    }

    proptest! {
        #[test]
        fn prop_receiver_only_yields_to_better_claims(
            seed in prop::array::uniform4(any::<u128>()),
            local_bid in 0.0f64..100.0,
            peer_bid in 0.0f64..100.0,
            local_stamp in 0u64..5,
            peer_stamp in 0u64..5,
            peer_pick in 0usize..5,
        ) {
            let ids = seed.map(|s| AgentId::from_uuid(uuid::Uuid::from_u128(s)));
            prop_assume!(ids[0] != ids[1]);
            let (me, sender) = (ids[0], ids[1]);
            let peer_winner = if peer_pick == 4 { Winner::None } else { Winner::Agent(ids[peer_pick]) };

            let local = record(Winner::Agent(me), local_bid, local_stamp);
            let peer = record(peer_winner, peer_bid, peer_stamp);

            // A record this agent holds is never replaced by a strictly lower bid.
            if decide(me, sender, &local, &peer) == Action::Update {
                prop_assert!(peer.bid >= local.bid);
            }
        }

        #[test]
        fn prop_identical_records_never_reset(
            seed in prop::array::uniform4(any::<u128>()),
            bid in 0.0f64..100.0,
            stamp in 0u64..5,
            pick in 0usize..5,
        ) {
            let ids = seed.map(|s| AgentId::from_uuid(uuid::Uuid::from_u128(s)));
            prop_assume!(ids[0] != ids[1]);
            let winner = if pick == 4 { Winner::None } else { Winner::Agent(ids[pick]) };
            let same = record(winner, bid, stamp);

            // Matching views never clear each other.
            prop_assert_ne!(decide(ids[0], ids[1], &same, &same), Action::Reset);
        }
    }
}
