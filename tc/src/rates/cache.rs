//! ProfileRateCache - profiles and their per-site shipping-rate groups
//!
//! Fetch results arrive asynchronously and out of order. Every merge reads
//! the profile as it is at apply time, so a fetch for a deleted profile is
//! dropped and the last applied response wins.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{IdAllocator, IdSource, Profile, RateGroup, RateQuote, Site, UuidIds};

/// Progress of a rate fetch for one profile at one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum FetchStatus {
    InProgress,
    Done,
    Failed(String),
}

/// Status message for a fetch that resolved without a usable selection
pub const INCOMPLETE_RESPONSE: &str = "incomplete response";

/// What `apply_fetch_result` did with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Rates merged and the status is `Done`
    Merged,
    /// Response lacked rates or a selection; groups untouched, status `Failed`
    Incomplete,
    /// Profile no longer exists
    Dropped,
}

type FetchKey = (String, String);

/// Profiles keyed by id, with rate groups keyed by site url
pub struct ProfileRateCache {
    profiles: IndexMap<String, Profile>,
    selected_site: Option<String>,
    fetch_status: HashMap<FetchKey, FetchStatus>,
    ids: IdAllocator<Box<dyn IdSource + Send>>,
}

impl Default for ProfileRateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRateCache {
    pub fn new() -> Self {
        Self::with_id_source(Box::new(UuidIds))
    }

    pub fn with_id_source(source: Box<dyn IdSource + Send>) -> Self {
        Self {
            profiles: IndexMap::new(),
            selected_site: None,
            fetch_status: HashMap::new(),
            ids: IdAllocator::with_source(source),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Snapshot of all profiles in insertion order
    pub fn list(&self) -> Vec<Profile> {
        self.profiles.values().cloned().collect()
    }

    pub fn selected_site(&self) -> Option<&str> {
        self.selected_site.as_deref()
    }

    /// Highlight a site, or clear the highlight
    pub fn select_site(&mut self, site_url: Option<String>) {
        debug!(?site_url, "ProfileRateCache::select_site: called");
        self.selected_site = site_url;
    }

    pub fn fetch_status(&self, profile_id: &str, site_url: &str) -> Option<&FetchStatus> {
        self.fetch_status.get(&(profile_id.to_string(), site_url.to_string()))
    }

    /// Add a profile under a freshly allocated id
    ///
    /// Any id on the incoming profile is ignored, as are its rate groups.
    pub fn add_profile(&mut self, mut profile: Profile) -> String {
        debug!(name = %profile.name, "ProfileRateCache::add_profile: called");
        let profiles = &self.profiles;
        let id = self.ids.allocate(|id| profiles.contains_key(id));
        profile.id = id.clone();
        profile.rates.clear();
        sync_billing(&mut profile);
        self.profiles.insert(id.clone(), profile);
        info!(%id, "Added profile");
        id
    }

    /// Replace a profile's body, keeping its id and rate groups
    pub fn update_profile(&mut self, id: &str, mut profile: Profile) -> bool {
        debug!(%id, "ProfileRateCache::update_profile: called");
        let Some(existing) = self.profiles.get_mut(id) else {
            debug!(%id, "ProfileRateCache::update_profile: unknown id");
            return false;
        };
        profile.id = existing.id.clone();
        profile.rates = std::mem::take(&mut existing.rates);
        sync_billing(&mut profile);
        *existing = profile;
        true
    }

    /// Delete a profile; pending fetches for it will be dropped on arrival
    pub fn remove_profile(&mut self, id: &str) -> Option<Profile> {
        debug!(%id, "ProfileRateCache::remove_profile: called");
        let removed = self.profiles.shift_remove(id)?;
        self.fetch_status.retain(|(profile_id, _), _| profile_id != id);
        info!(%id, "Removed profile");
        Some(removed)
    }

    /// Mark a fetch as in flight; false if the profile does not exist
    pub fn begin_fetch(&mut self, profile_id: &str, site_url: &str) -> bool {
        debug!(%profile_id, %site_url, "ProfileRateCache::begin_fetch: called");
        if !self.profiles.contains_key(profile_id) {
            return false;
        }
        self.fetch_status
            .insert((profile_id.to_string(), site_url.to_string()), FetchStatus::InProgress);
        true
    }

    /// Record a failed fetch; dropped if the profile is gone
    pub fn fail_fetch(&mut self, profile_id: &str, site_url: &str, message: impl Into<String>) -> bool {
        debug!(%profile_id, %site_url, "ProfileRateCache::fail_fetch: called");
        if !self.profiles.contains_key(profile_id) {
            return false;
        }
        self.fetch_status.insert(
            (profile_id.to_string(), site_url.to_string()),
            FetchStatus::Failed(message.into()),
        );
        true
    }

    /// Merge a fetch response into the profile's rate group for `site`
    ///
    /// A profile deleted while the fetch was in flight drops the response.
    /// A response missing rates or a selection leaves the groups alone and
    /// marks the fetch failed. Otherwise the incoming selection replaces the
    /// old one, and incoming rates replace any old rates of the same name.
    pub fn apply_fetch_result(
        &mut self,
        profile_id: &str,
        site: Site,
        rates: Vec<RateQuote>,
        selected_rate: Option<RateQuote>,
    ) -> FetchOutcome {
        debug!(%profile_id, site = %site.url, count = rates.len(), "ProfileRateCache::apply_fetch_result: called");
        let Some(profile) = self.profiles.get_mut(profile_id) else {
            debug!(%profile_id, "ProfileRateCache::apply_fetch_result: profile gone, dropping");
            return FetchOutcome::Dropped;
        };
        let Some(selected_rate) = selected_rate.filter(|_| !rates.is_empty()) else {
            debug!("ProfileRateCache::apply_fetch_result: incomplete response");
            self.fetch_status.insert(
                (profile_id.to_string(), site.url),
                FetchStatus::Failed(INCOMPLETE_RESPONSE.to_string()),
            );
            return FetchOutcome::Incomplete;
        };

        let site_url = site.url.clone();
        match profile.rates.get_mut(&site_url) {
            Some(group) => {
                debug!("ProfileRateCache::apply_fetch_result: merging into existing group");
                group.selected_rate = Some(selected_rate);
                let mut merged: Vec<RateQuote> = std::mem::take(&mut group.rates)
                    .into_iter()
                    .filter(|old| !rates.iter().any(|new| new.name == old.name))
                    .collect();
                merged.extend(rates);
                group.rates = merged;
            }
            None => {
                debug!("ProfileRateCache::apply_fetch_result: creating group");
                profile.rates.insert(
                    site_url.clone(),
                    RateGroup {
                        site,
                        rates,
                        selected_rate: Some(selected_rate),
                    },
                );
            }
        }

        self.fetch_status
            .insert((profile_id.to_string(), site_url), FetchStatus::Done);
        FetchOutcome::Merged
    }

    /// Remove one rate from a profile's group for `site_url`
    ///
    /// Clears the group's selection if it was the removed rate. A group left
    /// empty is removed, and the site highlight is cleared if it pointed there.
    pub fn delete_rate(&mut self, profile_id: &str, site_url: &str, rate_id: &str) -> bool {
        debug!(%profile_id, %site_url, %rate_id, "ProfileRateCache::delete_rate: called");
        let Some(profile) = self.profiles.get_mut(profile_id) else {
            return false;
        };
        let Some(group) = profile.rates.get_mut(site_url) else {
            return false;
        };
        let Some(pos) = group.rates.iter().position(|r| r.rate_id == rate_id) else {
            return false;
        };

        group.rates.remove(pos);
        if group.selected_rate.as_ref().is_some_and(|r| r.rate_id == rate_id) {
            group.selected_rate = None;
        }

        if group.rates.is_empty() {
            debug!(%site_url, "ProfileRateCache::delete_rate: group empty, removing");
            profile.rates.shift_remove(site_url);
            if self.selected_site.as_deref() == Some(site_url) {
                self.selected_site = None;
            }
        }
        true
    }
}

fn sync_billing(profile: &mut Profile) {
    if profile.billing_matches_shipping {
        profile.billing = profile.shipping.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Location;

    fn kith() -> Site {
        Site::new("Kith", "https://kith.com")
    }

    fn quote(name: &str, price: &str, id: &str) -> RateQuote {
        RateQuote::new(name, price, id)
    }

    fn cache_with_profile() -> (ProfileRateCache, String) {
        let mut cache = ProfileRateCache::new();
        let id = cache.add_profile(Profile::new("Main"));
        (cache, id)
    }

    #[test]
    fn test_add_profile_allocates_id_and_copies_billing() {
        let mut cache = ProfileRateCache::new();
        let mut profile = Profile::new("Main");
        profile.id = "ignored".into();
        profile.shipping = Location {
            city: "Brooklyn".into(),
            ..Default::default()
        };
        profile.billing_matches_shipping = true;

        let id = cache.add_profile(profile);
        assert_ne!(id, "ignored");
        let stored = cache.get(&id).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.billing.city, "Brooklyn");
    }

    #[test]
    fn test_update_profile_keeps_rates() {
        let (mut cache, id) = cache_with_profile();
        cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], Some(quote("Ground", "5", "r1")));

        assert!(cache.update_profile(&id, Profile::new("Renamed")));
        let stored = cache.get(&id).unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.id, id);
        assert!(stored.rate_group("https://kith.com").is_some());
        assert!(!cache.update_profile("missing", Profile::new("x")));
    }

    #[test]
    fn test_apply_creates_group() {
        let (mut cache, id) = cache_with_profile();
        assert!(cache.begin_fetch(&id, "https://kith.com"));
        assert_eq!(cache.fetch_status(&id, "https://kith.com"), Some(&FetchStatus::InProgress));

        assert_eq!(
            cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], Some(quote("Ground", "5", "r1"))),
            FetchOutcome::Merged
        );
        let group = cache.get(&id).unwrap().rate_group("https://kith.com").unwrap();
        assert_eq!(group.rates.len(), 1);
        assert_eq!(group.selected_rate.as_ref().unwrap().rate_id, "r1");
        assert_eq!(cache.fetch_status(&id, "https://kith.com"), Some(&FetchStatus::Done));
    }

    #[test]
    fn test_apply_incomplete_response_marks_failed() {
        let (mut cache, id) = cache_with_profile();
        cache.begin_fetch(&id, "https://kith.com");
        assert_eq!(
            cache.apply_fetch_result(&id, kith(), vec![], Some(quote("Ground", "5", "r1"))),
            FetchOutcome::Incomplete
        );
        assert_eq!(
            cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], None),
            FetchOutcome::Incomplete
        );
        assert!(cache.get(&id).unwrap().rates.is_empty());
        assert_eq!(
            cache.fetch_status(&id, "https://kith.com"),
            Some(&FetchStatus::Failed(INCOMPLETE_RESPONSE.into()))
        );
    }

    #[test]
    fn test_incomplete_response_keeps_existing_group() {
        let (mut cache, id) = cache_with_profile();
        cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], Some(quote("Ground", "5", "r1")));
        let before = cache.get(&id).unwrap().rates.clone();

        cache.apply_fetch_result(&id, kith(), vec![], None);
        assert_eq!(cache.get(&id).unwrap().rates, before);
    }

    #[test]
    fn test_apply_for_deleted_profile_is_dropped() {
        let (mut cache, id) = cache_with_profile();
        cache.begin_fetch(&id, "https://kith.com");
        cache.remove_profile(&id);
        let before = cache.list();

        assert_eq!(
            cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], Some(quote("Ground", "5", "r1"))),
            FetchOutcome::Dropped
        );
        assert_eq!(cache.list(), before);
        assert!(!cache.contains(&id));
        assert_eq!(cache.fetch_status(&id, "https://kith.com"), None);
        assert!(!cache.fail_fetch(&id, "https://kith.com", "late"));
    }

    #[test]
    fn test_merge_incoming_replaces_same_name() {
        let (mut cache, id) = cache_with_profile();
        cache.apply_fetch_result(
            &id,
            kith(),
            vec![quote("Ground", "5", "r1"), quote("Express", "15", "r2")],
            Some(quote("Ground", "5", "r1")),
        );
        cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "6", "r3")], Some(quote("Ground", "6", "r3")));

        let group = cache.get(&id).unwrap().rate_group("https://kith.com").unwrap();
        assert_eq!(group.rates, vec![quote("Express", "15", "r2"), quote("Ground", "6", "r3")]);
        assert_eq!(group.selected_rate, Some(quote("Ground", "6", "r3")));
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let (mut cache, id) = cache_with_profile();
        let rates = vec![quote("Ground", "5", "r1"), quote("Express", "15", "r2")];
        cache.apply_fetch_result(&id, kith(), rates.clone(), Some(quote("Ground", "5", "r1")));
        let once = cache.get(&id).unwrap().clone();
        cache.apply_fetch_result(&id, kith(), rates, Some(quote("Ground", "5", "r1")));
        assert_eq!(cache.get(&id).unwrap(), &once);
    }

    #[test]
    fn test_one_group_per_site() {
        let (mut cache, id) = cache_with_profile();
        for i in 0..3 {
            let rid = format!("r{}", i);
            cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", &rid)], Some(quote("Ground", "5", &rid)));
        }
        let other = Site::new("Undefeated", "https://undefeated.com");
        cache.apply_fetch_result(&id, other, vec![quote("Ground", "5", "u1")], Some(quote("Ground", "5", "u1")));
        assert_eq!(cache.get(&id).unwrap().rates.len(), 2);
    }

    #[test]
    fn test_fail_fetch_sets_message() {
        let (mut cache, id) = cache_with_profile();
        cache.begin_fetch(&id, "https://kith.com");
        assert!(cache.fail_fetch(&id, "https://kith.com", "timeout"));
        assert_eq!(
            cache.fetch_status(&id, "https://kith.com"),
            Some(&FetchStatus::Failed("timeout".into()))
        );
    }

    #[test]
    fn test_delete_selected_rate_clears_selection() {
        let (mut cache, id) = cache_with_profile();
        cache.apply_fetch_result(
            &id,
            kith(),
            vec![quote("Ground", "5", "r1"), quote("Express", "15", "r2")],
            Some(quote("Ground", "5", "r1")),
        );
        assert!(cache.delete_rate(&id, "https://kith.com", "r1"));
        let group = cache.get(&id).unwrap().rate_group("https://kith.com").unwrap();
        assert_eq!(group.rates, vec![quote("Express", "15", "r2")]);
        assert_eq!(group.selected_rate, None);
    }

    #[test]
    fn test_delete_last_rate_removes_group_and_highlight() {
        let (mut cache, id) = cache_with_profile();
        cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], Some(quote("Ground", "5", "r1")));
        cache.select_site(Some("https://kith.com".into()));

        assert!(cache.delete_rate(&id, "https://kith.com", "r1"));
        assert!(cache.get(&id).unwrap().rate_group("https://kith.com").is_none());
        assert_eq!(cache.selected_site(), None);
    }

    #[test]
    fn test_delete_last_rate_keeps_other_highlight() {
        let (mut cache, id) = cache_with_profile();
        cache.apply_fetch_result(&id, kith(), vec![quote("Ground", "5", "r1")], Some(quote("Ground", "5", "r1")));
        cache.select_site(Some("https://undefeated.com".into()));
        cache.delete_rate(&id, "https://kith.com", "r1");
        assert_eq!(cache.selected_site(), Some("https://undefeated.com"));
    }

    #[test]
    fn test_delete_unknown_rate_is_noop() {
        let (mut cache, id) = cache_with_profile();
        assert!(!cache.delete_rate(&id, "https://kith.com", "r1"));
        assert!(!cache.delete_rate("missing", "https://kith.com", "r1"));
    }
}
