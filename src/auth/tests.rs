use super::*;
use crate::utils::error::{AuthError, HubError};
use jsonwebtoken::{EncodingKey, Header, encode};

const SECRET: &str = "test-secret";

fn token_for(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn future_exp() -> usize {
    (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize
}

#[test]
fn topic_class_parses_known_prefixes() {
    assert_eq!(TopicClass::parse("public:news"), Some(TopicClass::Public));
    assert_eq!(TopicClass::parse("private:ops"), Some(TopicClass::Private));
    assert_eq!(TopicClass::parse("system:alerts"), Some(TopicClass::System));
    assert_eq!(TopicClass::parse("user:42"), Some(TopicClass::User("42")));
    assert_eq!(
        TopicClass::parse("user:42:inbox"),
        Some(TopicClass::User("42"))
    );
}

#[test]
fn topic_class_rejects_malformed_names() {
    for name in ["", "news", "public:", "user:", "user::inbox", "admin:x", ":x"] {
        assert_eq!(TopicClass::parse(name), None, "{name} should be invalid");
        assert_eq!(
            validate_topic(name),
            Err(HubError::InvalidTopic(name.to_string()))
        );
    }
}

#[test]
fn authorization_matrix_for_regular_users() {
    let policy = Policy::default();
    let alice = Principal::user("alice");
    let insider = Principal::user("bob").with_permission("private_channel_access");

    let cases = [
        (&alice, "public:news", Action::Subscribe, true),
        (&alice, "public:news", Action::Publish, true),
        (&alice, "private:ops", Action::Subscribe, false),
        (&alice, "private:ops", Action::Publish, false),
        (&insider, "private:ops", Action::Subscribe, true),
        (&insider, "private:ops", Action::Publish, true),
        (&alice, "user:alice", Action::Subscribe, true),
        (&alice, "user:alice:inbox", Action::Publish, true),
        (&alice, "user:bob", Action::Subscribe, false),
        (&alice, "user:bob", Action::Publish, false),
        (&alice, "user:alicex", Action::Subscribe, false),
        (&alice, "system:alerts", Action::Subscribe, true),
        (&alice, "system:alerts", Action::Publish, false),
        (&alice, "chat", Action::Subscribe, false),
        (&alice, "chat", Action::Publish, false),
    ];

    for (principal, topic, action, expected) in cases {
        assert_eq!(
            policy.allow(principal, topic, action),
            expected,
            "{} {action} {topic}",
            principal.id
        );
    }
}

#[test]
fn admin_bypasses_every_check() {
    let policy = Policy::default();
    let admin = Principal::admin("root");

    for topic in [
        "public:a",
        "private:a",
        "user:someone",
        "system:alerts",
        "garbage",
    ] {
        for action in [Action::Subscribe, Action::Publish] {
            assert!(policy.allow(&admin, topic, action), "{action} {topic}");
        }
    }
}

#[test]
fn private_permission_name_is_configurable() {
    let policy = Policy::new("ops_team");
    let default_holder = Principal::user("a").with_permission("private_channel_access");
    let ops = Principal::user("b").with_permission("ops_team");

    assert!(!policy.allow(&default_holder, "private:ops", Action::Subscribe));
    assert!(policy.allow(&ops, "private:ops", Action::Subscribe));
}

#[test]
fn check_reports_invalid_topic_before_permission() {
    let policy = Policy::default();
    let admin = Principal::admin("root");
    let alice = Principal::user("alice");

    assert_eq!(
        policy.check(&admin, "garbage", Action::Subscribe),
        Err(HubError::InvalidTopic("garbage".into()))
    );
    assert_eq!(
        policy.check(&alice, "system:alerts", Action::Publish),
        Err(HubError::PermissionDenied {
            action: Action::Publish,
            topic: "system:alerts".into()
        })
    );
    assert_eq!(policy.check(&alice, "system:alerts", Action::Subscribe), Ok(()));
}

#[test]
fn verifier_builds_principal_from_claims() {
    let claims = Claims {
        sub: "alice".into(),
        role: Role::User,
        permissions: vec!["private_channel_access".into()],
        exp: future_exp(),
    };
    let verifier = TokenVerifier::new(SECRET);

    let principal = verifier.verify(&token_for(&claims, SECRET)).unwrap();
    assert_eq!(principal.id, "alice");
    assert_eq!(principal.role, Role::User);
    assert!(principal.has_permission("private_channel_access"));
}

#[test]
fn verifier_reads_admin_role_and_defaults_unknown_roles_to_user() {
    let verifier = TokenVerifier::new(SECRET);
    let exp = future_exp();

    let admin = serde_json::json!({ "sub": "root", "role": "admin", "exp": exp });
    let operator = serde_json::json!({ "sub": "op", "role": "operator", "exp": exp });
    let bare = serde_json::json!({ "sub": "anon", "exp": exp });

    let encode_value = |value: &serde_json::Value| {
        encode(
            &Header::default(),
            value,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    };

    assert!(verifier.verify(&encode_value(&admin)).unwrap().is_admin());
    assert_eq!(
        verifier.verify(&encode_value(&operator)).unwrap().role,
        Role::User
    );
    assert_eq!(
        verifier.verify(&encode_value(&bare)).unwrap().role,
        Role::User
    );
}

#[test]
fn verifier_rejects_bad_tokens() {
    let verifier = TokenVerifier::new(SECRET);
    let claims = Claims {
        sub: "alice".into(),
        role: Role::User,
        permissions: vec![],
        exp: future_exp(),
    };

    assert!(matches!(verifier.verify(""), Err(AuthError::MissingToken)));
    assert!(matches!(
        verifier.verify("not.a.token"),
        Err(AuthError::InvalidToken(_))
    ));
    assert!(matches!(
        verifier.verify(&token_for(&claims, "other-secret")),
        Err(AuthError::InvalidToken(_))
    ));

    let expired = Claims {
        exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() as usize,
        ..claims
    };
    assert!(matches!(
        verifier.verify(&token_for(&expired, SECRET)),
        Err(AuthError::InvalidToken(_))
    ));
}
