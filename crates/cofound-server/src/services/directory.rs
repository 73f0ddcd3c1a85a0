//! Co-founder search: who may be listed, and how well they match a filter.

use std::sync::Arc;

use cofound_shared::{
    api::{SearchParams, SearchResponse, SearchResultItem},
    PublicProfile, RelationshipStatus, User,
};

use super::profiles::ProfileRepository;
use super::relationships::{relationship_between, relationship_map, RelationshipEngine};
use crate::auth::Session;
use crate::error::AppError;

pub const SKILL_WEIGHT: u32 = 40;
pub const DOMAIN_WEIGHT: u32 = 30;
pub const EXPERIENCE_WEIGHT: u32 = 20;
pub const AVAILABILITY_WEIGHT: u32 = 10;

/// Search criteria. Blank inputs count as unset. Skill and domain are kept
/// lowercased for substring matching; experience and availability verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    skill: Option<String>,
    domain: Option<String>,
    experience: Option<String>,
    availability: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

impl Criteria {
    pub fn from_params(params: &SearchParams) -> Self {
        Self {
            skill: present(&params.skill).map(|v| v.to_lowercase()),
            domain: present(&params.domain).map(|v| v.to_lowercase()),
            experience: present(&params.experience),
            availability: present(&params.availability),
        }
    }

    /// No criteria means browse mode: every discoverable user, unscored.
    pub fn is_empty(&self) -> bool {
        self.skill.is_none()
            && self.domain.is_none()
            && self.experience.is_none()
            && self.availability.is_none()
    }
}

/// Verified users with an approved certificate, other than the caller.
pub fn is_discoverable(candidate: &User, caller: &str) -> bool {
    candidate.username != caller && candidate.verified && candidate.certificate_approved
}

pub fn score(candidate: &User, criteria: &Criteria) -> u32 {
    let contains = |field: &str, wanted: &Option<String>| {
        wanted
            .as_deref()
            .is_some_and(|w| field.to_lowercase().contains(w))
    };
    let equals = |field: &str, wanted: &Option<String>| {
        wanted
            .as_deref()
            .is_some_and(|w| field == w)
    };

    let mut total = 0;
    if contains(candidate.skills(), &criteria.skill) {
        total += SKILL_WEIGHT;
    }
    if contains(candidate.domain(), &criteria.domain) {
        total += DOMAIN_WEIGHT;
    }
    if equals(candidate.experience(), &criteria.experience) {
        total += EXPERIENCE_WEIGHT;
    }
    if equals(candidate.availability(), &criteria.availability) {
        total += AVAILABILITY_WEIGHT;
    }
    total
}

#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a> {
    pub user: &'a User,
    pub score: u32,
}

/// Discoverable candidates that match, best first. Ties keep input order.
pub fn rank<'a>(caller: &str, users: &'a [User], criteria: &Criteria) -> Vec<Ranked<'a>> {
    let browse = criteria.is_empty();
    let mut ranked: Vec<Ranked<'a>> = users
        .iter()
        .filter(|u| is_discoverable(u, caller))
        .map(|user| Ranked {
            user,
            score: if browse { 0 } else { score(user, criteria) },
        })
        .filter(|r| browse || r.score > 0)
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

#[derive(Clone)]
pub struct DirectoryService {
    profiles: ProfileRepository,
    relationships: RelationshipEngine,
}

impl DirectoryService {
    pub fn new(profiles: ProfileRepository, relationships: RelationshipEngine) -> Self {
        Self {
            profiles,
            relationships,
        }
    }

    pub async fn search(
        &self,
        session: &Session,
        params: &SearchParams,
    ) -> Result<SearchResponse, AppError> {
        let (users, requests) = tokio::try_join!(
            self.profiles.list_all(),
            self.relationships.list_requests(&session.username),
        )?;

        if !session.is_admin() {
            let caller = users
                .iter()
                .find(|u| u.username == session.username)
                .ok_or_else(|| AppError::not_found("Profile"))?;
            if !caller.certificate_approved {
                return Err(AppError::NotApproved);
            }
        }

        let criteria = Criteria::from_params(params);
        let relationships = relationship_map(&session.username, &requests);

        let results: Vec<SearchResultItem> = rank(&session.username, &users, &criteria)
            .into_iter()
            .map(|ranked| {
                let relationship = relationships
                    .get(&ranked.user.username)
                    .copied()
                    .unwrap_or_default();
                SearchResultItem {
                    profile: PublicProfile::from(ranked.user),
                    score: ranked.score,
                    relationship,
                }
            })
            .filter(|item| {
                params
                    .relationship
                    .map_or(true, |wanted| item.relationship == wanted)
            })
            .collect();

        tracing::debug!(
            "{} searched the directory: {} results",
            session.username,
            results.len()
        );
        Ok(SearchResponse {
            total: results.len(),
            browse: criteria.is_empty(),
            results,
        })
    }

    /// A single profile as `viewer` may see it. Contact links are only
    /// shown to matched partners, admins and the owner.
    pub async fn view_profile(
        &self,
        viewer: &Session,
        username: &str,
    ) -> Result<(PublicProfile, RelationshipStatus), AppError> {
        let (user, requests) = tokio::try_join!(
            self.profiles.get_by_username(username),
            self.relationships.list_requests(&viewer.username),
        )?;

        let relationship = relationship_between(&viewer.username, username, &requests);
        let mut profile = PublicProfile::from(&user);
        if relationship == RelationshipStatus::Connected
            || viewer.is_admin()
            || viewer.username == user.username
        {
            profile.contacts = Some(user.contacts());
        }
        Ok((profile, relationship))
    }
}
