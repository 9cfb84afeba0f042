use crate::types::{
    ServicePrincipal, TrustPolicyDocument, TrustPrincipal, TrustStatement, POLICY_VERSION,
};

pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

/// Build a single-statement trust policy letting `principal` assume the role
pub fn build_trust_policy(principal: ServicePrincipal) -> TrustPolicyDocument {
    TrustPolicyDocument {
        version: POLICY_VERSION.to_string(),
        statement: vec![TrustStatement {
            sid: String::new(),
            effect: "Allow".to_string(),
            principal: TrustPrincipal {
                service: principal.service_host(),
            },
            action: ASSUME_ROLE_ACTION.to_string(),
        }],
    }
}
