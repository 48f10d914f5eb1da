use proptest::prelude::*;
use qqmusic_edge::{
    CommonParams, Credential, Envelope, ModuleCall, cookie_header, parse_credential, sign,
    sign_envelope,
};
use serde_json::json;

fn credential_strategy() -> impl Strategy<Value = Credential> {
    (
        (
            any::<String>(),
            any::<String>(),
            any::<String>(),
            any::<i64>(),
            "[0-9]{0,12}",
            "[A-Za-z0-9_]{0,40}",
        ),
        (
            any::<String>(),
            any::<String>(),
            any::<String>(),
            any::<String>(),
            any::<i64>().prop_filter("非零", |n| *n != 0),
            any::<i64>(),
            any::<i64>().prop_filter("非零", |n| *n != 0),
        ),
    )
        .prop_map(
            |(
                (openid, refresh_token, access_token, expired_at, musicid, musickey),
                (
                    unionid,
                    str_musicid,
                    refresh_key,
                    encrypt_uin,
                    login_type,
                    musickey_createtime,
                    key_expires_in,
                ),
            )| Credential {
                openid,
                refresh_token,
                access_token,
                expired_at,
                musicid,
                musickey,
                unionid,
                str_musicid,
                refresh_key,
                encrypt_uin,
                login_type,
                musickey_createtime,
                key_expires_in,
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_sign_is_deterministic_and_well_formed(payload in any::<Vec<u8>>()) {
        let token = sign(&payload);

        prop_assert_eq!(&token, &sign(&payload));
        prop_assert!(token.starts_with("zzc"));
        prop_assert!(!token.contains(['\\', '/', '+', '=']));
        prop_assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        prop_assert!(token.len() <= 3 + 7 + 27 + 8);
    }

    #[test]
    fn test_exported_credential_parses_back(credential in credential_strategy()) {
        let exported = serde_json::to_string(&credential).unwrap();
        let parsed = parse_credential(&exported);

        prop_assert_eq!(parsed, Some(credential));
    }

    #[test]
    fn test_auth_fields_follow_validity(credential in credential_strategy()) {
        let comm = CommonParams::for_credential(Some(&credential));

        prop_assert_eq!(comm.is_authenticated(), credential.is_valid());
        prop_assert_eq!(comm.get("qq").is_some(), credential.is_valid());
        prop_assert_eq!(cookie_header(Some(&credential)).is_empty(), !credential.is_valid());
    }

    #[test]
    fn test_envelope_signature_is_stable(
        credential in credential_strategy(),
        module in "[a-zA-Z.]{1,30}",
        method in "[a-zA-Z_]{1,20}",
        num in 1_i64..500,
    ) {
        let build = || {
            Envelope::build(
                Some(&credential),
                vec![ModuleCall::new(module.as_str(), method.as_str(), json!({"num": num}))],
            )
        };

        let first = sign_envelope(&build()).unwrap();
        let second = sign_envelope(&build()).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, sign(&serde_json::to_vec(&build()).unwrap()));
    }

    #[test]
    fn test_parse_credential_never_panics(raw in any::<String>()) {
        let _ = parse_credential(&raw);
    }
}
