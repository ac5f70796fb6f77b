// SPDX-License-Identifier: Apache-2.0

//! Conversation-link registry.

use crate::engine::Engine;
use crate::error::EngineError;
use teleclaude_adapters::SessionAdapter;
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::link::{ConversationLink, LinkId, LinkMember, LinkMode};
use teleclaude_core::session::SessionId;
use teleclaude_core::Clock;

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    /// Idempotent by member pair: returns the existing active direct link
    /// between `sender` and `recipient` if one exists. No two active
    /// direct links ever exist between the same pair.
    pub fn create_or_reuse_direct_link(&self, sender: &SessionId, recipient: &SessionId) -> Result<ConversationLink, EngineError> {
        if let Some(existing) = self.get_active_link_between_sessions(sender, recipient) {
            return Ok(existing);
        }

        let link_id = LinkId::new(self.id_gen.next());
        self.apply(Event::LinkCreated {
            link_id: link_id.clone(),
            mode: LinkMode::DirectLink,
            created_by_session_id: sender.clone(),
        })?;
        self.add_member(&link_id, sender)?;
        self.add_member(&link_id, recipient)?;

        self.lock_state(|state| state.conversation_links.get(&link_id).cloned())
            .ok_or_else(|| EngineError::not_found(&link_id))
    }

    pub fn add_member(&self, link_id: &LinkId, session_id: &SessionId) -> Result<(), EngineError> {
        self.apply(Event::LinkMemberAdded {
            link_id: link_id.clone(),
            session_id: session_id.clone(),
        })
    }

    /// Removing a member that drops the membership count below 2 closes
    /// the link.
    pub fn remove_member(&self, link_id: &LinkId, session_id: &SessionId) -> Result<(), EngineError> {
        self.apply(Event::LinkMemberRemoved {
            link_id: link_id.clone(),
            session_id: session_id.clone(),
        })?;
        let remaining = self.lock_state(|state| state.link_members(link_id).len());
        if remaining < 2 {
            self.apply(Event::LinkClosed { link_id: link_id.clone() })?;
        }
        Ok(())
    }

    pub fn get_active_link_between_sessions(&self, a: &SessionId, b: &SessionId) -> Option<ConversationLink> {
        self.lock_state(|state| {
            state
                .conversation_links
                .values()
                .find(|link| {
                    link.is_active() && {
                        let members = state.link_members(&link.link_id);
                        members.iter().any(|m| &m.session_id == a) && members.iter().any(|m| &m.session_id == b)
                    }
                })
                .cloned()
        })
    }

    pub fn list_peer_members(&self, link_id: &LinkId, excluding: &SessionId) -> Vec<LinkMember> {
        self.lock_state(|state| {
            state
                .link_members(link_id)
                .iter()
                .filter(|m| &m.session_id != excluding)
                .cloned()
                .collect()
        })
    }

    /// Scoped close: with `target_session_id`, closes only the shared link
    /// with that target, or returns `None` without touching any other link
    /// the caller belongs to. Without it, closes every active link the
    /// caller belongs to.
    pub fn close_link_for_member(&self, session_id: &SessionId, target_session_id: Option<&SessionId>) -> Result<Option<LinkId>, EngineError> {
        match target_session_id {
            Some(target) => match self.get_active_link_between_sessions(session_id, target) {
                Some(link) => {
                    self.apply(Event::LinkClosed {
                        link_id: link.link_id.clone(),
                    })?;
                    Ok(Some(link.link_id))
                }
                None => Ok(None),
            },
            None => {
                let links = self.active_links_for_session(session_id);
                for link_id in &links {
                    self.apply(Event::LinkClosed { link_id: link_id.clone() })?;
                }
                Ok(links.into_iter().next())
            }
        }
    }

    /// Called on session end: severs memberships, closing links that drop
    /// below two members.
    pub fn cleanup_links_for_session(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let links = self.active_links_for_session(session_id);
        for link_id in links {
            self.remove_member(&link_id, session_id)?;
        }
        Ok(())
    }

    pub(crate) fn active_links_for_session(&self, session_id: &SessionId) -> Vec<LinkId> {
        self.lock_state(|state| {
            state
                .conversation_links
                .values()
                .filter(|link| link.is_active() && state.link_members(&link.link_id).iter().any(|m| &m.session_id == session_id))
                .map(|link| link.link_id.clone())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_engine;

    #[test]
    fn create_or_reuse_is_idempotent_by_member_pair() {
        let engine = test_engine();
        let a = SessionId::new("a");
        let b = SessionId::new("b");

        let first = engine.create_or_reuse_direct_link(&a, &b).unwrap();
        let second = engine.create_or_reuse_direct_link(&a, &b).unwrap();
        assert_eq!(first.link_id, second.link_id);
    }

    #[test]
    fn removing_member_below_two_closes_link() {
        let engine = test_engine();
        let a = SessionId::new("a");
        let b = SessionId::new("b");
        let link = engine.create_or_reuse_direct_link(&a, &b).unwrap();

        engine.remove_member(&link.link_id, &a).unwrap();
        let closed = engine.lock_state(|s| s.conversation_links[&link.link_id].clone());
        assert!(!closed.is_active());
    }

    #[test]
    fn scoped_close_only_touches_shared_link() {
        let engine = test_engine();
        let a = SessionId::new("a");
        let b = SessionId::new("b");
        let c = SessionId::new("c");
        let link_ab = engine.create_or_reuse_direct_link(&a, &b).unwrap();
        let link_ac = engine.create_or_reuse_direct_link(&a, &c).unwrap();

        let result = engine.close_link_for_member(&a, Some(&b)).unwrap();
        assert_eq!(result, Some(link_ab.link_id.clone()));

        assert!(!engine.lock_state(|s| s.conversation_links[&link_ab.link_id].clone()).is_active());
        assert!(engine.lock_state(|s| s.conversation_links[&link_ac.link_id].clone()).is_active());
    }

    #[test]
    fn scoped_close_with_no_shared_link_returns_none() {
        let engine = test_engine();
        let a = SessionId::new("a");
        let b = SessionId::new("b");
        let c = SessionId::new("c");
        engine.create_or_reuse_direct_link(&a, &b).unwrap();

        let result = engine.close_link_for_member(&a, Some(&c)).unwrap();
        assert_eq!(result, None);
        assert!(engine.lock_state(|s| s.conversation_links.values().next().unwrap().clone()).is_active());
    }

    #[test]
    fn cleanup_severs_memberships_on_session_end() {
        let engine = test_engine();
        let a = SessionId::new("a");
        let b = SessionId::new("b");
        let link = engine.create_or_reuse_direct_link(&a, &b).unwrap();

        engine.cleanup_links_for_session(&a).unwrap();
        let closed = engine.lock_state(|s| s.conversation_links[&link.link_id].clone());
        assert!(!closed.is_active());
    }
}
