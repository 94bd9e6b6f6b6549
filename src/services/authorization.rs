//! Role capabilities
//!
//! One static table answers "may this role attempt this action". Actions
//! scoped to a publisher are additionally checked against membership by
//! the calling service, see [`require_member`].

use crate::db::repositories::PublisherRepository;
use crate::models::{User, UserRole};
use crate::services::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Subscribe,
    CreateContent,
    ReviewContent,
    CreatePublisher,
    InviteMember,
    RequestJoin,
    ReviewJoinRequest,
    ManageAnyContent,
    ManageUsers,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Subscribe,
        Action::CreateContent,
        Action::ReviewContent,
        Action::CreatePublisher,
        Action::InviteMember,
        Action::RequestJoin,
        Action::ReviewJoinRequest,
        Action::ManageAnyContent,
        Action::ManageUsers,
    ];

    /// Whether the action is limited to members of the target publisher
    pub fn is_membership_scoped(&self, role: UserRole) -> bool {
        match self {
            Action::InviteMember | Action::ReviewJoinRequest => true,
            Action::ReviewContent => role != UserRole::Admin,
            _ => false,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Action::Subscribe => "subscribe",
            Action::CreateContent => "create content",
            Action::ReviewContent => "review content",
            Action::CreatePublisher => "create a publisher",
            Action::InviteMember => "invite members",
            Action::RequestJoin => "request to join a publisher",
            Action::ReviewJoinRequest => "review join requests",
            Action::ManageAnyContent => "manage content of others",
            Action::ManageUsers => "manage users",
        }
    }
}

pub struct Capability;

impl Capability {
    pub fn allows(role: UserRole, action: Action) -> bool {
        use Action::*;
        use UserRole::*;

        match action {
            Subscribe => role == Reader,
            CreateContent => matches!(role, Journalist | Editor | Admin),
            ReviewContent => matches!(role, Editor | Admin),
            CreatePublisher => role == Editor,
            InviteMember | RequestJoin | ReviewJoinRequest => matches!(role, Journalist | Editor),
            ManageAnyContent | ManageUsers => role == Admin,
        }
    }
}

/// Fail with `Forbidden` unless the user's role allows `action`
pub fn require(user: &User, action: Action) -> ServiceResult<()> {
    if Capability::allows(user.role, action) {
        Ok(())
    } else {
        Err(ServiceError::forbidden(format!(
            "A {} may not {}",
            user.role,
            action.describe()
        )))
    }
}

/// Role check plus membership of `publisher_id` where the action calls for it
pub async fn require_member(
    publishers: &dyn PublisherRepository,
    user: &User,
    action: Action,
    publisher_id: i64,
) -> ServiceResult<()> {
    require(user, action)?;
    if action.is_membership_scoped(user.role) && !publishers.is_member(user.id, publisher_id).await? {
        return Err(ServiceError::forbidden(format!(
            "Only members of publisher {} may {}",
            publisher_id,
            action.describe()
        )));
    }
    Ok(())
}

/// Review permission for content that may be independent.
///
/// Editors need membership in the content's publisher, which independent
/// content does not have. Admins may review anything.
pub async fn require_reviewer(
    publishers: &dyn PublisherRepository,
    user: &User,
    publisher_id: Option<i64>,
) -> ServiceResult<()> {
    require(user, Action::ReviewContent)?;
    if user.is_admin() {
        return Ok(());
    }
    match publisher_id {
        Some(id) => require_member(publishers, user, Action::ReviewContent, id).await,
        None => Err(ServiceError::forbidden(
            "Independent content can only be reviewed by an admin",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{seed_publisher, seed_user, setup_pool};
    use crate::db::repositories::SqlxPublisherRepository;

    #[test]
    fn test_capability_table() {
        use Action::*;
        use UserRole::*;

        let expected: &[(Action, &[UserRole])] = &[
            (Subscribe, &[Reader]),
            (CreateContent, &[Journalist, Editor, Admin]),
            (ReviewContent, &[Editor, Admin]),
            (CreatePublisher, &[Editor]),
            (InviteMember, &[Journalist, Editor]),
            (RequestJoin, &[Journalist, Editor]),
            (ReviewJoinRequest, &[Journalist, Editor]),
            (ManageAnyContent, &[Admin]),
            (ManageUsers, &[Admin]),
        ];
        for (action, roles) in expected {
            for role in UserRole::ALL {
                assert_eq!(
                    Capability::allows(role, *action),
                    roles.contains(&role),
                    "{:?} / {:?}",
                    role,
                    action
                );
            }
        }
    }

    #[tokio::test]
    async fn test_reviewer_needs_membership() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let eve = seed_user(&pool, "eve", None, UserRole::Editor).await;
        let root = seed_user(&pool, "root", None, UserRole::Admin).await;
        let alice = seed_user(&pool, "alice", None, UserRole::Journalist).await;
        let daily = seed_publisher(&pool, "Daily", bob.id).await;
        let repo = SqlxPublisherRepository::new(pool);

        assert!(require_reviewer(&repo, &bob, Some(daily.id)).await.is_ok());
        assert!(require_reviewer(&repo, &root, Some(daily.id)).await.is_ok());
        assert!(require_reviewer(&repo, &root, None).await.is_ok());
        for (user, publisher) in [(&eve, Some(daily.id)), (&bob, None), (&alice, Some(daily.id))] {
            let result = require_reviewer(&repo, user, publisher).await;
            assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        }
    }

    #[tokio::test]
    async fn test_require_member_for_invites() {
        let pool = setup_pool().await;
        let bob = seed_user(&pool, "bob", None, UserRole::Editor).await;
        let eve = seed_user(&pool, "eve", None, UserRole::Editor).await;
        let daily = seed_publisher(&pool, "Daily", bob.id).await;
        let repo = SqlxPublisherRepository::new(pool);

        assert!(require_member(&repo, &bob, Action::InviteMember, daily.id).await.is_ok());
        assert!(matches!(
            require_member(&repo, &eve, Action::InviteMember, daily.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        // not scoped: any journalist/editor may ask to join
        assert!(require_member(&repo, &eve, Action::RequestJoin, daily.id).await.is_ok());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_role() -> impl Strategy<Value = UserRole> {
            prop::sample::select(UserRole::ALL.to_vec())
        }

        fn any_action() -> impl Strategy<Value = Action> {
            prop::sample::select(Action::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            #[test]
            fn readers_only_subscribe(action in any_action()) {
                prop_assert_eq!(
                    Capability::allows(UserRole::Reader, action),
                    action == Action::Subscribe
                );
            }

            #[test]
            fn require_agrees_with_table(role in any_role(), action in any_action()) {
                let user = User::new("someone".to_string(), None, String::new(), role);
                prop_assert_eq!(require(&user, action).is_ok(), Capability::allows(role, action));
            }
        }
    }
}
