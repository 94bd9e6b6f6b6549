//! Publisher service
//!
//! Publishers, their members and the two ways of joining one: an invitation
//! sent by a member, or a join request approved by a member.

use crate::db::repositories::{InvitationRepository, JoinRequestRepository, PublisherRepository};
use crate::models::{
    normalize_email, CollaborationInvitation, CreateInvitationInput, CreatePublisherInput,
    JoinRequest, JoinRequestStatus, Publisher, PublisherMember, User,
};
use crate::services::authorization::{require, require_member, Action};
use crate::services::email::is_deliverable_address;
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::password::generate_token;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

const MAX_NAME_LEN: usize = 255;

/// A publisher with its member list
#[derive(Debug, Clone, Serialize)]
pub struct PublisherDetails {
    #[serde(flatten)]
    pub publisher: Publisher,
    pub members: Vec<PublisherMember>,
}

pub struct PublisherService {
    repo: Arc<dyn PublisherRepository>,
    invitations: Arc<dyn InvitationRepository>,
    join_requests: Arc<dyn JoinRequestRepository>,
}

impl PublisherService {
    pub fn new(
        repo: Arc<dyn PublisherRepository>,
        invitations: Arc<dyn InvitationRepository>,
        join_requests: Arc<dyn JoinRequestRepository>,
    ) -> Self {
        Self {
            repo,
            invitations,
            join_requests,
        }
    }

    /// Create a publisher owned by `user`, who becomes its first member
    pub async fn create(&self, user: &User, input: CreatePublisherInput) -> ServiceResult<Publisher> {
        require(user, Action::CreatePublisher)?;

        let name = input.name.trim();
        let mut errors = FieldErrors::new();
        if name.is_empty() {
            errors.add("name", "This field is required.");
        } else if name.chars().count() > MAX_NAME_LEN {
            errors.add(
                "name",
                format!("Ensure this field has no more than {} characters.", MAX_NAME_LEN),
            );
        }
        errors.into_result()?;

        if self.repo.get_by_owner(user.id).await?.is_some() {
            return Err(ServiceError::conflict("You already own a publisher"));
        }
        if self.repo.get_by_name(name).await?.is_some() {
            return Err(ServiceError::invalid("name", "A publisher with this name already exists."));
        }

        let input = CreatePublisherInput {
            name: name.to_string(),
            description: input.description,
        };
        let publisher = self.repo.create_with_owner(&input, user.id).await?;
        tracing::info!(publisher_id = publisher.id, owner_id = user.id, "Publisher created");
        Ok(publisher)
    }

    pub async fn list(&self) -> ServiceResult<Vec<Publisher>> {
        Ok(self.repo.list().await?)
    }

    pub async fn get(&self, id: i64) -> ServiceResult<PublisherDetails> {
        let publisher = self.load(id).await?;
        let members = self.repo.members(id).await?;
        Ok(PublisherDetails { publisher, members })
    }

    /// Invite an email address to join `publisher_id` with the given role
    pub async fn invite(
        &self,
        user: &User,
        publisher_id: i64,
        input: CreateInvitationInput,
    ) -> ServiceResult<CollaborationInvitation> {
        self.load(publisher_id).await?;
        require_member(self.repo.as_ref(), user, Action::InviteMember, publisher_id).await?;

        let email = normalize_email(&input.email);
        let mut errors = FieldErrors::new();
        if !is_deliverable_address(&email) {
            errors.add("email", "Enter a valid email address.");
        }
        if !input.role.is_staff() {
            errors.add("role", format!("\"{}\" is not a valid choice.", input.role));
        }
        errors.into_result()?;

        let invitation = self
            .invitations
            .create(&CollaborationInvitation {
                id: 0,
                email,
                publisher_id,
                role: input.role,
                token: generate_token(),
                accepted: false,
                invited_by: user.id,
                created_at: Utc::now(),
                accepted_at: None,
            })
            .await?;
        tracing::info!(
            invitation_id = invitation.id,
            publisher_id,
            invited_by = user.id,
            role = %invitation.role,
            "Invitation sent"
        );
        Ok(invitation)
    }

    /// Pending invitations addressed to the user's email
    pub async fn my_invitations(&self, user: &User) -> ServiceResult<Vec<CollaborationInvitation>> {
        match user.contact_address() {
            Some(email) => Ok(self.invitations.list_pending_for_email(email).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Accept an invitation by token. The user joins the publisher and takes
    /// the invited role. Tokens work once.
    pub async fn accept_invitation(&self, user: &User, token: &str) -> ServiceResult<Publisher> {
        let invitation = self
            .invitations
            .get_pending_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invitation", "for this token"))?;

        if user.contact_address() != Some(invitation.email.as_str()) {
            return Err(ServiceError::forbidden("This invitation was sent to another address"));
        }
        if user.is_admin() {
            return Err(ServiceError::forbidden("Admins cannot change role through an invitation"));
        }
        if !self.invitations.accept(&invitation, user.id).await? {
            return Err(ServiceError::conflict("This invitation has already been accepted"));
        }
        tracing::info!(
            invitation_id = invitation.id,
            user_id = user.id,
            publisher_id = invitation.publisher_id,
            role = %invitation.role,
            "Invitation accepted"
        );
        self.load(invitation.publisher_id).await
    }

    /// Ask to join a publisher. Asking twice returns the first request.
    pub async fn request_join(&self, user: &User, publisher_id: i64) -> ServiceResult<JoinRequest> {
        require(user, Action::RequestJoin)?;
        self.load(publisher_id).await?;
        if self.repo.is_member(user.id, publisher_id).await? {
            return Err(ServiceError::conflict("You are already a member of this publisher"));
        }
        let request = self.join_requests.create_or_get(user.id, publisher_id).await?;
        tracing::info!(request_id = request.id, user_id = user.id, publisher_id, "Join request filed");
        Ok(request)
    }

    pub async fn join_requests(
        &self,
        user: &User,
        publisher_id: i64,
        status: Option<JoinRequestStatus>,
    ) -> ServiceResult<Vec<JoinRequest>> {
        self.load(publisher_id).await?;
        require_member(self.repo.as_ref(), user, Action::ReviewJoinRequest, publisher_id).await?;
        Ok(self.join_requests.list_for_publisher(publisher_id, status).await?)
    }

    /// Approve or reject a pending join request
    pub async fn decide_join_request(
        &self,
        user: &User,
        request_id: i64,
        approve: bool,
    ) -> ServiceResult<JoinRequest> {
        let request = self
            .join_requests
            .get_by_id(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Join request", request_id))?;
        require_member(
            self.repo.as_ref(),
            user,
            Action::ReviewJoinRequest,
            request.publisher_id,
        )
        .await?;

        let status = if approve {
            JoinRequestStatus::Approved
        } else {
            JoinRequestStatus::Rejected
        };
        if !request.is_pending() || !self.join_requests.decide(&request, status, user.id).await? {
            return Err(ServiceError::conflict("This join request has already been decided"));
        }
        tracing::info!(request_id, decided_by = user.id, status = %status, "Join request decided");

        self.join_requests
            .get_by_id(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Join request", request_id))
    }

    async fn load(&self, id: i64) -> ServiceResult<Publisher> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Publisher", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_publisher, seed_user, setup_pool};
    use crate::db::repositories::{
        SqlxInvitationRepository, SqlxJoinRequestRepository, SqlxPublisherRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::UserRole;

    fn service(pool: &DynDatabasePool) -> PublisherService {
        PublisherService::new(
            SqlxPublisherRepository::boxed(pool.clone()),
            SqlxInvitationRepository::boxed(pool.clone()),
            SqlxJoinRequestRepository::boxed(pool.clone()),
        )
    }

    fn publisher_input(name: &str) -> CreatePublisherInput {
        CreatePublisherInput {
            name: name.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_publisher_rules() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let eve = seed_user(&pool, "eve", None, UserRole::Editor).await;
        let alice = seed_user(&pool, "alice", None, UserRole::Journalist).await;
        let service = service(&pool);

        let daily = service.create(&bob, publisher_input("  Daily ")).await.unwrap();
        assert_eq!(daily.name, "Daily");
        let details = service.get(daily.id).await.unwrap();
        assert_eq!(details.members.len(), 1);
        assert_eq!(details.members[0].user_id, bob.id);

        assert!(matches!(
            service.create(&bob, publisher_input("Second")).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.create(&eve, publisher_input("Daily")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service.create(&alice, publisher_input("Mine")).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_invitation_token_is_single_use() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let carol = seed_user(&pool, "carol", Some("Carol@Example.com"), UserRole::Reader).await;
        let daily = seed_publisher(&pool, "Daily", bob.id).await;
        let service = service(&pool);

        let invitation = service
            .invite(
                &bob,
                daily.id,
                CreateInvitationInput {
                    email: " CAROL@example.com ".to_string(),
                    role: UserRole::Journalist,
                },
            )
            .await
            .unwrap();
        assert_eq!(invitation.email, "carol@example.com");
        assert_eq!(invitation.token.len(), 43);
        assert_eq!(service.my_invitations(&carol).await.unwrap().len(), 1);

        let joined = service.accept_invitation(&carol, &invitation.token).await.unwrap();
        assert_eq!(joined.id, daily.id);
        let again = service.accept_invitation(&carol, &invitation.token).await;
        assert!(matches!(again, Err(ServiceError::NotFound { .. })));

        let members = service.get(daily.id).await.unwrap().members;
        assert_eq!(members.iter().filter(|m| m.user_id == carol.id).count(), 1);
        let carol = SqlxUserRepository::new(pool.clone())
            .get_by_id(carol.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(carol.role, UserRole::Journalist);
    }

    #[tokio::test]
    async fn test_invitation_checks() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let eve = seed_user(&pool, "eve", Some("eve@example.com"), UserRole::Editor).await;
        let daily = seed_publisher(&pool, "Daily", bob.id).await;
        let service = service(&pool);

        let outsider = service
            .invite(
                &eve,
                daily.id,
                CreateInvitationInput {
                    email: "x@example.com".to_string(),
                    role: UserRole::Journalist,
                },
            )
            .await;
        assert!(matches!(outsider, Err(ServiceError::Forbidden(_))));

        match service
            .invite(
                &bob,
                daily.id,
                CreateInvitationInput {
                    email: "nope".to_string(),
                    role: UserRole::Admin,
                },
            )
            .await
        {
            Err(ServiceError::Validation(errors)) => {
                assert!(errors.contains("email"));
                assert!(errors.contains("role"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let invitation = service
            .invite(
                &bob,
                daily.id,
                CreateInvitationInput {
                    email: "someone@example.com".to_string(),
                    role: UserRole::Editor,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            service.accept_invitation(&eve, &invitation.token).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_join_request_flow() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let alice = seed_user(&pool, "alice", None, UserRole::Journalist).await;
        let daily = seed_publisher(&pool, "Daily", bob.id).await;
        let service = service(&pool);

        let first = service.request_join(&alice, daily.id).await.unwrap();
        let second = service.request_join(&alice, daily.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            service
                .join_requests(&bob, daily.id, Some(JoinRequestStatus::Pending))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            service.join_requests(&alice, daily.id, None).await,
            Err(ServiceError::Forbidden(_))
        ));

        let approved = service.decide_join_request(&bob, first.id, true).await.unwrap();
        assert_eq!(approved.status, JoinRequestStatus::Approved);
        assert_eq!(approved.decided_by, Some(bob.id));
        assert!(matches!(
            service.decide_join_request(&bob, first.id, false).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.request_join(&alice, daily.id).await,
            Err(ServiceError::Conflict(_))
        ));
    }
}
