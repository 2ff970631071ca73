//! Expertise-based assignment with in-run load balancing.
//!
//! The [`AssignmentMatcher`] is the only mutable state shared between
//! concurrently processed issues. Each decision (candidate selection plus load
//! increment) happens under a single lock acquisition, so the lowest-load
//! tie-break stays correct under concurrency.
//!
//! Load counters only reflect assignments made by this run; a member's real
//! outstanding workload on the tracker is not consulted. An assignment that is
//! never written is handed back with [`AssignmentMatcher::release`], and a
//! member the tracker refuses to assign is dropped from candidacy for the rest
//! of the run with [`AssignmentMatcher::reject`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::classifier::contains_term;
use crate::{Category, CategoryRule, Domain, TeamMember, Username};

/// Domain → eligible usernames, each list in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpertiseMap {
    by_domain: BTreeMap<Domain, Vec<Username>>,
}

impl ExpertiseMap {
    /// Derives the map from a roster, preserving roster order per domain.
    pub fn from_roster(roster: &[TeamMember]) -> Self {
        let mut by_domain: BTreeMap<Domain, Vec<Username>> = BTreeMap::new();
        for member in roster {
            for domain in &member.domains {
                by_domain
                    .entry(domain.clone())
                    .or_default()
                    .push(member.username.clone());
            }
        }
        Self { by_domain }
    }

    /// Members eligible for `domain`; empty when nobody covers it.
    pub fn members(&self, domain: &Domain) -> &[Username] {
        self.by_domain.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Chooses an assignee for classified issues.
#[derive(Debug)]
pub struct AssignmentMatcher {
    roster: Vec<Username>,
    expertise: ExpertiseMap,
    category_domains: BTreeMap<Category, Vec<Domain>>,
    domain_hints: BTreeMap<Domain, Vec<String>>,
    book: Mutex<LoadBook>,
}

#[derive(Debug, Default)]
struct LoadBook {
    loads: BTreeMap<Username, u32>,
    rejected: BTreeSet<Username>,
}

impl LoadBook {
    fn release(&mut self, username: &Username) {
        if let Some(load) = self.loads.get_mut(username) {
            *load = load.saturating_sub(1);
            if *load == 0 {
                self.loads.remove(username);
            }
        }
    }
}

impl AssignmentMatcher {
    pub fn new(
        roster: &[TeamMember],
        rules: &[CategoryRule],
        domain_hints: &BTreeMap<Domain, Vec<String>>,
    ) -> Self {
        let domain_hints = domain_hints
            .iter()
            .map(|(domain, words)| {
                let words = words
                    .iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                (domain.clone(), words)
            })
            .collect();
        Self {
            roster: roster.iter().map(|m| m.username.clone()).collect(),
            expertise: ExpertiseMap::from_roster(roster),
            category_domains: rules
                .iter()
                .map(|r| (r.name.clone(), r.domains.clone()))
                .collect(),
            domain_hints,
            book: Mutex::new(LoadBook::default()),
        }
    }

    /// Domains eligible for `categories`, narrowed by hint keywords found in
    /// `text` wherever a category maps to more than one domain.
    pub fn domains_for(&self, categories: &BTreeSet<Category>, text: &str) -> BTreeSet<Domain> {
        let text = text.to_lowercase();
        let mut domains = BTreeSet::new();
        for category in categories {
            let Some(mapped) = self.category_domains.get(category) else {
                continue;
            };
            if mapped.len() > 1 {
                let hinted: Vec<&Domain> = mapped
                    .iter()
                    .filter(|d| self.is_hinted(d, &text))
                    .collect();
                if !hinted.is_empty() {
                    domains.extend(hinted.into_iter().cloned());
                    continue;
                }
            }
            domains.extend(mapped.iter().cloned());
        }
        domains
    }

    /// Picks the eligible member with the lowest load in this run (ties go to
    /// the earliest roster entry) and increments their load.
    ///
    /// Returns `None` when no member covers any eligible domain, or every
    /// eligible member has been rejected; the issue is then left unassigned.
    pub fn assign(&self, categories: &BTreeSet<Category>, text: &str) -> Option<Username> {
        let domains = self.domains_for(categories, text);
        let candidates: Vec<&Username> = if domains.iter().any(Domain::is_any) {
            self.roster.iter().collect()
        } else {
            let eligible: BTreeSet<&Username> = domains
                .iter()
                .flat_map(|d| self.expertise.members(d))
                .collect();
            self.roster.iter().filter(|u| eligible.contains(u)).collect()
        };

        let mut book = self.lock();
        let chosen = candidates
            .into_iter()
            .enumerate()
            .filter(|(_, username)| !book.rejected.contains(*username))
            .min_by_key(|(position, username)| {
                (book.loads.get(*username).copied().unwrap_or(0), *position)
            })
            .map(|(_, username)| username.clone())?;
        *book.loads.entry(chosen.clone()).or_insert(0) += 1;
        Some(chosen)
    }

    /// Hands back the load taken by [`Self::assign`] for an assignment that
    /// was never written.
    pub fn release(&self, username: &Username) {
        self.lock().release(username);
    }

    /// Releases `username`'s pending assignment and stops choosing them for
    /// the rest of the run.
    pub fn reject(&self, username: &Username) {
        let mut book = self.lock();
        book.release(username);
        if book.rejected.insert(username.clone()) {
            debug!(%username, "Member excluded from assignment for this run");
        }
    }

    /// Assignments made to `username` so far in this run.
    pub fn load_of(&self, username: &Username) -> u32 {
        self.lock().loads.get(username).copied().unwrap_or(0)
    }

    /// Snapshot of all non-zero loads.
    pub fn loads(&self) -> BTreeMap<Username, u32> {
        self.lock().loads.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LoadBook> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_hinted(&self, domain: &Domain, text: &str) -> bool {
        self.domain_hints
            .get(domain)
            .is_some_and(|words| words.iter().any(|w| contains_term(text, w)))
    }
}
