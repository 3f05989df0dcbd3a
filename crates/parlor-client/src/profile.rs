//! Profile, flair and presence operations on the [`Session`].

use parlor_shared::catalog::{self, Completeness};
use parlor_shared::documents::{Presence, User};
use parlor_store::ProfileUpdate;

use crate::error::Result;
use crate::events::ClientEvent;
use crate::session::Session;

impl Session {
    /// Apply a profile edit. The store's echo becomes the session identity,
    /// so a badge granted along the way shows up immediately.
    pub fn update_profile(&mut self, update: ProfileUpdate) -> Result<User> {
        let me = self.me()?;
        let result = self.store.update_profile(me.id, update);
        let updated = self.relay(result)?;
        self.user = Some(updated.clone());
        self.push(ClientEvent::ProfileChanged(updated.clone()));
        Ok(updated)
    }

    /// Pick the presence dot everyone else sees.
    pub fn set_status(&mut self, status: Presence) -> Result<User> {
        let me = self.me()?;
        let result = self.store.set_status(me.id, status);
        let updated = self.relay(result)?;
        self.user = Some(updated.clone());
        self.push(ClientEvent::ProfileChanged(updated.clone()));
        self.online.poke();
        Ok(updated)
    }

    /// The signed-in profile scored against the completeness checklist.
    pub fn profile_completeness(&self) -> Option<Completeness> {
        self.user.as_ref().map(catalog::completeness)
    }
}
