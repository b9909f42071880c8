//! Certificate policy processing per RFC 5280 section 6.1, applied to a completed path anchor-adjacent
//! first.
//!
//! Rather than materializing the full valid_policy_tree, the checker retains only the leaves of
//! the tree. Each leaf remembers the first non-anyPolicy policy on its branch (the policy in the
//! authority's domain), which is all that is needed for the final intersection with the
//! user-initial-policy-set.

use std::collections::{BTreeMap, BTreeSet};

use const_oid::db::rfc5280::ANY_POLICY;
use const_oid::db::rfc5912::*;
use der::asn1::ObjectIdentifier;
use log::{debug, error};

use crate::util::error::*;
use crate::util::pdv_utilities::name_to_string;
use crate::validator::path_settings::{ObjectIdentifierSet, PathSettings};
use crate::validator::pdv_certificate::PDVCertificate;
use crate::validator::pdv_extension::{ExtensionProcessing, PDVExtension};

/// Leaf of the valid policy tree
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyNode {
    /// Policy valid for the path processed so far
    pub valid_policy: ObjectIdentifier,
    /// Policies that satisfy valid_policy in the next certificate
    pub expected_policy_set: ObjectIdentifierSet,
    /// First non-anyPolicy policy on the branch, if any
    pub authority_policy: Option<ObjectIdentifier>,
}

impl PolicyNode {
    fn root() -> PolicyNode {
        let mut expected = ObjectIdentifierSet::new();
        expected.insert(ANY_POLICY);
        PolicyNode {
            valid_policy: ANY_POLICY,
            expected_policy_set: expected,
            authority_policy: None,
        }
    }

    fn child(&self, policy: ObjectIdentifier) -> PolicyNode {
        let mut expected = ObjectIdentifierSet::new();
        expected.insert(policy);
        let authority_policy = match self.authority_policy {
            Some(p) => Some(p),
            None if ANY_POLICY != policy => Some(policy),
            None => None,
        };
        PolicyNode {
            valid_policy: policy,
            expected_policy_set: expected,
            authority_policy,
        }
    }
}

/// `PolicyProcessingState` holds the RFC 5280 policy state variables for one path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyProcessingState {
    /// Leaves of the valid_policy_tree, or None when the tree is NULL
    pub nodes: Option<Vec<PolicyNode>>,
    /// explicit_policy counter
    pub explicit_policy: usize,
    /// policy_mapping counter
    pub policy_mapping: usize,
    /// inhibit_anyPolicy counter
    pub inhibit_any_policy: usize,
    /// Index of the next certificate, starting at 1
    pub cert_index: usize,
    /// Number of certificates in the path
    pub path_len: usize,
}

/// `PolicyChecker` carries the policy related inputs from [`PathSettings`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyChecker {
    initial_policy_set: ObjectIdentifierSet,
    explicit_policy_required: bool,
    policy_mapping_inhibited: bool,
    any_policy_inhibited: bool,
}

impl PolicyChecker {
    /// Creates a checker from explicit inputs
    pub fn new(
        initial_policy_set: ObjectIdentifierSet,
        explicit_policy_required: bool,
        policy_mapping_inhibited: bool,
        any_policy_inhibited: bool,
    ) -> PolicyChecker {
        PolicyChecker {
            initial_policy_set,
            explicit_policy_required,
            policy_mapping_inhibited,
            any_policy_inhibited,
        }
    }

    /// Creates a checker from the PS_INITIAL_* values in [`PathSettings`]
    pub fn from_settings(ps: &PathSettings) -> PolicyChecker {
        PolicyChecker::new(
            ps.get_initial_policy_set_as_oid_set(),
            ps.get_initial_explicit_policy_indicator(),
            ps.get_initial_policy_mapping_inhibit_indicator(),
            ps.get_initial_inhibit_any_policy_indicator(),
        )
    }

    /// Returns the policies an end entity certificate must assert one of in order to possibly
    /// yield a valid path, or None when any certificate may do.
    pub fn end_entity_policy_filter(&self) -> Option<ObjectIdentifierSet> {
        if self.explicit_policy_required && !self.initial_policy_set.contains(&ANY_POLICY) {
            Some(self.initial_policy_set.clone())
        } else {
            None
        }
    }

    /// Initializes state for a path containing `path_len` certificates (excluding the trust anchor)
    pub fn init(&self, path_len: usize) -> PolicyProcessingState {
        let initial = |inhibited: bool| if inhibited { 0 } else { path_len + 1 };
        PolicyProcessingState {
            nodes: Some(vec![PolicyNode::root()]),
            explicit_policy: initial(self.explicit_policy_required),
            policy_mapping: initial(self.policy_mapping_inhibited),
            inhibit_any_policy: initial(self.any_policy_inhibited),
            cert_index: 1,
            path_len,
        }
    }

    /// Processes the next certificate in the path (RFC 5280 6.1.3 (d)-(f) and 6.1.4 (a)-(b), (h)-(j))
    pub fn check(&self, state: &mut PolicyProcessingState, cert: &PDVCertificate) -> Result<()> {
        let i = state.cert_index;
        let is_final = i == state.path_len;
        let self_issued = cert.is_self_issued();

        let cert_policies: Option<Vec<ObjectIdentifier>> = cert.policy_oids();

        // 6.1.3 (d) and (e)
        state.nodes = match (&state.nodes, &cert_policies) {
            (Some(nodes), Some(policies)) => {
                let mut children: Vec<PolicyNode> = vec![];
                for p in policies.iter().filter(|p| ANY_POLICY != **p) {
                    let matched: Vec<&PolicyNode> = nodes
                        .iter()
                        .filter(|n| n.expected_policy_set.contains(p))
                        .collect();
                    if !matched.is_empty() {
                        for parent in matched {
                            push_unique(&mut children, parent.child(*p));
                        }
                    } else {
                        for parent in nodes.iter().filter(|n| ANY_POLICY == n.valid_policy) {
                            push_unique(&mut children, parent.child(*p));
                        }
                    }
                }

                let asserts_any = policies.contains(&ANY_POLICY);
                if asserts_any && (state.inhibit_any_policy > 0 || (!is_final && self_issued)) {
                    for parent in nodes {
                        for expected in &parent.expected_policy_set {
                            let present = children.iter().any(|c| {
                                c.valid_policy == *expected
                                    && c.authority_policy == parent.child(*expected).authority_policy
                            });
                            if !present {
                                push_unique(&mut children, parent.child(*expected));
                            }
                        }
                    }
                }
                if children.is_empty() {
                    None
                } else {
                    Some(children)
                }
            }
            _ => None,
        };

        // 6.1.3 (f)
        if 0 == state.explicit_policy && state.nodes.is_none() {
            error!(
                "Valid policy tree became empty at certificate issued to {} while explicit policy is required",
                name_to_string(cert.subject())
            );
            return Err(Error::PathValidation(PathValidationStatus::NullPolicySet));
        }

        if !is_final {
            self.process_mappings(state, cert)?;

            // 6.1.4 (h)
            if !self_issued {
                state.explicit_policy = state.explicit_policy.saturating_sub(1);
                state.policy_mapping = state.policy_mapping.saturating_sub(1);
                state.inhibit_any_policy = state.inhibit_any_policy.saturating_sub(1);
            }

            // 6.1.4 (i)
            if let Ok(Some(PDVExtension::PolicyConstraints(pc))) =
                cert.get_extension(&ID_CE_POLICY_CONSTRAINTS)
            {
                if let Some(rep) = pc.require_explicit_policy {
                    state.explicit_policy = state.explicit_policy.min(rep as usize);
                }
                if let Some(ipm) = pc.inhibit_policy_mapping {
                    state.policy_mapping = state.policy_mapping.min(ipm as usize);
                }
            }

            // 6.1.4 (j)
            if let Ok(Some(PDVExtension::InhibitAnyPolicy(iap))) =
                cert.get_extension(&ID_CE_INHIBIT_ANY_POLICY)
            {
                state.inhibit_any_policy = state.inhibit_any_policy.min(iap.0 as usize);
            }
        }

        state.cert_index += 1;
        Ok(())
    }

    // 6.1.4 (a) and (b)
    fn process_mappings(&self, state: &mut PolicyProcessingState, cert: &PDVCertificate) -> Result<()> {
        let mappings = match cert.get_extension(&ID_CE_POLICY_MAPPINGS) {
            Ok(Some(PDVExtension::PolicyMappings(pm))) => pm,
            _ => return Ok(()),
        };

        let mut map: BTreeMap<ObjectIdentifier, ObjectIdentifierSet> = BTreeMap::new();
        for m in &mappings.0 {
            if ANY_POLICY == m.issuer_domain_policy || ANY_POLICY == m.subject_domain_policy {
                error!(
                    "Policy mappings extension in certificate issued to {} maps anyPolicy",
                    name_to_string(cert.subject())
                );
                return Err(Error::PathValidation(
                    PathValidationStatus::InvalidPolicyMapping,
                ));
            }
            map.entry(m.issuer_domain_policy)
                .or_default()
                .insert(m.subject_domain_policy);
        }

        let nodes = match state.nodes.take() {
            Some(nodes) => nodes,
            None => return Ok(()),
        };

        let mut updated: Vec<PolicyNode> = vec![];
        if state.policy_mapping > 0 {
            let any_node = nodes.iter().find(|n| ANY_POLICY == n.valid_policy).cloned();
            for (idp, sdps) in &map {
                let mut found = false;
                for n in nodes.iter().filter(|n| n.valid_policy == *idp) {
                    found = true;
                    let mut mapped = n.clone();
                    mapped.expected_policy_set = sdps.clone();
                    push_unique(&mut updated, mapped);
                }
                if !found {
                    if let Some(any_node) = &any_node {
                        let mut mapped = any_node.child(*idp);
                        mapped.expected_policy_set = sdps.clone();
                        push_unique(&mut updated, mapped);
                    }
                }
            }
            for n in nodes.into_iter().filter(|n| !map.contains_key(&n.valid_policy)) {
                push_unique(&mut updated, n);
            }
        } else {
            debug!("Policy mapping inhibited; removing mapped issuer domain policies");
            updated = nodes
                .into_iter()
                .filter(|n| !map.contains_key(&n.valid_policy))
                .collect();
        }

        state.nodes = if updated.is_empty() {
            None
        } else {
            Some(updated)
        };
        Ok(())
    }

    /// Performs wrap-up processing (RFC 5280 6.1.5) given the final certificate and returns the set
    /// of valid policies, which is empty when the valid_policy_tree is NULL.
    pub fn finish(
        &self,
        state: &mut PolicyProcessingState,
        target: &PDVCertificate,
    ) -> Result<ObjectIdentifierSet> {
        // 6.1.5 (a) and (b)
        state.explicit_policy = state.explicit_policy.saturating_sub(1);
        if let Ok(Some(PDVExtension::PolicyConstraints(pc))) =
            target.get_extension(&ID_CE_POLICY_CONSTRAINTS)
        {
            if Some(0) == pc.require_explicit_policy {
                state.explicit_policy = 0;
            }
        }

        // 6.1.5 (g)
        let mut valid = BTreeSet::new();
        if let Some(nodes) = &state.nodes {
            if self.initial_policy_set.contains(&ANY_POLICY) {
                for n in nodes {
                    valid.insert(n.valid_policy);
                }
            } else {
                for n in nodes {
                    match n.authority_policy {
                        Some(ap) if self.initial_policy_set.contains(&ap) => {
                            valid.insert(n.valid_policy);
                        }
                        None if ANY_POLICY == n.valid_policy => {
                            valid.extend(self.initial_policy_set.iter().cloned());
                        }
                        _ => {}
                    }
                }
            }
        }

        if 0 == state.explicit_policy && valid.is_empty() {
            error!(
                "No acceptable policy for path terminating at {} while explicit policy is required",
                name_to_string(target.subject())
            );
            return Err(Error::PathValidation(PathValidationStatus::NullPolicySet));
        }
        Ok(valid)
    }
}

fn push_unique(nodes: &mut Vec<PolicyNode>, node: PolicyNode) {
    if let Some(existing) = nodes.iter_mut().find(|n| {
        n.valid_policy == node.valid_policy && n.authority_policy == node.authority_policy
    }) {
        existing
            .expected_policy_set
            .extend(node.expected_policy_set.into_iter());
    } else {
        nodes.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::pdv_certificate::parse_cert;

    const P1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1.1");
    const P2: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1.2");
    const P3: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1.3");

    fn load(name: &str) -> PDVCertificate {
        let path = format!("{}/tests/examples/{}", env!("CARGO_MANIFEST_DIR"), name);
        parse_cert(&std::fs::read(path).unwrap(), name).unwrap()
    }

    fn run(checker: &PolicyChecker, path: &[PDVCertificate]) -> Result<ObjectIdentifierSet> {
        let mut state = checker.init(path.len());
        for cert in path {
            checker.check(&mut state, cert)?;
        }
        checker.finish(&mut state, &path[path.len() - 1])
    }

    fn set(oids: &[ObjectIdentifier]) -> ObjectIdentifierSet {
        oids.iter().cloned().collect()
    }

    #[test]
    fn no_policies_without_explicit_policy() {
        let checker = PolicyChecker::from_settings(&PathSettings::new());
        let path = vec![load("inter.der"), load("ee.der")];
        assert!(run(&checker, &path).unwrap().is_empty());
        assert_eq!(None, checker.end_entity_policy_filter());
    }

    #[test]
    fn no_policies_with_explicit_policy() {
        let checker = PolicyChecker::new(set(&[ANY_POLICY]), true, false, false);
        let path = vec![load("inter.der"), load("ee.der")];
        assert_eq!(
            Err(Error::PathValidation(PathValidationStatus::NullPolicySet)),
            run(&checker, &path)
        );
    }

    #[test]
    fn asserted_and_mapped_policies() {
        let checker = PolicyChecker::new(set(&[ANY_POLICY]), true, false, false);
        let inter = load("polinter.der");

        let path = vec![inter.clone(), load("polee1.der")];
        assert_eq!(set(&[P1]), run(&checker, &path).unwrap());

        let path = vec![inter.clone(), load("polee3.der")];
        assert_eq!(set(&[P3]), run(&checker, &path).unwrap());

        let path = vec![inter, load("polee4.der")];
        assert_eq!(
            Err(Error::PathValidation(PathValidationStatus::NullPolicySet)),
            run(&checker, &path)
        );
    }

    #[test]
    fn initial_policy_set_intersection() {
        let checker = PolicyChecker::new(set(&[P2]), true, false, false);
        assert_eq!(Some(set(&[P2])), checker.end_entity_policy_filter());
        let inter = load("polinter.der");

        // P3 is reached through the mapping from P2
        let path = vec![inter.clone(), load("polee3.der")];
        assert_eq!(set(&[P3]), run(&checker, &path).unwrap());

        let path = vec![inter.clone(), load("polee1.der")];
        assert_eq!(
            Err(Error::PathValidation(PathValidationStatus::NullPolicySet)),
            run(&checker, &path)
        );

        // without explicit policy the path is acceptable with an empty policy set
        let checker = PolicyChecker::new(set(&[P2]), false, false, false);
        let path = vec![inter, load("polee1.der")];
        assert!(run(&checker, &path).unwrap().is_empty());
    }

    #[test]
    fn mapping_inhibited() {
        let checker = PolicyChecker::new(set(&[ANY_POLICY]), true, true, false);
        let path = vec![load("polinter.der"), load("polee3.der")];
        assert_eq!(
            Err(Error::PathValidation(PathValidationStatus::NullPolicySet)),
            run(&checker, &path)
        );
    }
}
