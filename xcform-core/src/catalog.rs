//! Catalog - Built-in resource descriptors
//!
//! A representative table of kinds across all three timeout categories.
//! Each entry is data only; the generic controller does the rest.

use crate::descriptor::{DescriptorRegistry, ResourceDescriptor};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use crate::timeouts::TimeoutCategory;

/// Prefix of the configuration API paths
const CONFIG_API: &str = "/api/config/namespaces/{namespace}";

/// Kinds whose create/update/delete provision infrastructure downstream
pub const LONG_RUNNING_KINDS: &[&str] = &[
    "aws_vpc_site",
    "azure_vnet_site",
    "gcp_vpc_site",
    "aws_tgw_site",
    "voltstack_site",
    "securemesh_site",
    "securemesh_site_v2",
    "k8s_cluster",
    "virtual_k8s",
];

/// Kinds whose changes are destructive or hard to reverse
pub const CRITICAL_KINDS: &[&str] = &["cloud_credentials", "namespace_role"];

/// Timeout category of a kind by name
pub fn category_for(type_name: &str) -> TimeoutCategory {
    if LONG_RUNNING_KINDS.contains(&type_name) {
        TimeoutCategory::LongRunning
    } else if CRITICAL_KINDS.contains(&type_name) {
        TimeoutCategory::Critical
    } else {
        TimeoutCategory::Standard
    }
}

fn descriptor(type_name: &str, collection: &str, schema: ResourceSchema) -> ResourceDescriptor {
    ResourceDescriptor::new(type_name, format!("{}/{}", CONFIG_API, collection), schema)
        .with_timeout_category(category_for(type_name))
}

fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

/// Reference to another object (`{name, namespace, tenant}`)
fn object_ref() -> AttributeType {
    AttributeType::block([
        AttributeSchema::new("name", AttributeType::String).required(),
        AttributeSchema::new("namespace", AttributeType::String),
        AttributeSchema::new("tenant", AttributeType::String).optional_computed(),
    ])
}

/// Choice marker block with no attributes (e.g. `no_tls {}`)
fn empty_block() -> AttributeType {
    AttributeType::block([])
}

fn healthcheck() -> ResourceDescriptor {
    let schema = ResourceSchema::with_common_attributes("healthcheck")
        .with_description("Health check used by origin pools")
        .attribute(
            AttributeSchema::new(
                "http_health_check",
                AttributeType::block([
                    AttributeSchema::new("path", AttributeType::String),
                    AttributeSchema::new("host_header", AttributeType::String),
                    AttributeSchema::new("use_http2", AttributeType::Bool),
                    AttributeSchema::new("expected_status_codes", string_list()),
                ]),
            )
            .conflicts_with("tcp_health_check"),
        )
        .attribute(AttributeSchema::new(
            "tcp_health_check",
            AttributeType::block([
                AttributeSchema::new("send_payload", AttributeType::String),
                AttributeSchema::new("expected_response", AttributeType::String),
            ]),
        ))
        .attribute(AttributeSchema::new("timeout", AttributeType::Int).optional_computed())
        .attribute(AttributeSchema::new("interval", AttributeType::Int).optional_computed())
        .attribute(
            AttributeSchema::new("unhealthy_threshold", AttributeType::Int).optional_computed(),
        )
        .attribute(
            AttributeSchema::new("healthy_threshold", AttributeType::Int).optional_computed(),
        )
        .attribute(AttributeSchema::new("jitter_percent", AttributeType::Int));

    descriptor("healthcheck", "healthchecks", schema)
}

fn origin_pool() -> ResourceDescriptor {
    let origin_server = AttributeType::block([
        AttributeSchema::new(
            "public_name",
            AttributeType::block([AttributeSchema::new("dns_name", AttributeType::String)
                .required()]),
        )
        .conflicts_with("public_ip"),
        AttributeSchema::new(
            "public_ip",
            AttributeType::block([AttributeSchema::new("ip", AttributeType::String).required()]),
        ),
        AttributeSchema::new("labels", types::labels()),
    ]);

    let schema = ResourceSchema::with_common_attributes("origin_pool")
        .with_description("Pool of origin servers")
        .attribute(
            AttributeSchema::new("origin_servers", AttributeType::List(Box::new(origin_server)))
                .required(),
        )
        .attribute(AttributeSchema::new("port", types::port()).required())
        .attribute(
            AttributeSchema::new(
                "endpoint_selection",
                AttributeType::enumeration(&["DISTRIBUTED", "LOCAL_ONLY", "LOCAL_PREFERRED"]),
            )
            .optional_computed()
            .with_zero_default("DISTRIBUTED"),
        )
        .attribute(
            AttributeSchema::new(
                "loadbalancer_algorithm",
                AttributeType::enumeration(&[
                    "ROUND_ROBIN",
                    "LEAST_REQUEST",
                    "RING_HASH",
                    "RANDOM",
                    "LB_OVERRIDE",
                ]),
            )
            .optional_computed()
            .with_zero_default("ROUND_ROBIN"),
        )
        .attribute(
            AttributeSchema::new("healthcheck", AttributeType::List(Box::new(object_ref()))),
        )
        .attribute(AttributeSchema::new("no_tls", empty_block()).conflicts_with("use_tls"))
        .attribute(AttributeSchema::new(
            "use_tls",
            AttributeType::block([
                AttributeSchema::new("sni", AttributeType::String),
                AttributeSchema::new("skip_server_verification", empty_block()),
            ]),
        ));

    descriptor("origin_pool", "origin_pools", schema)
}

fn http_loadbalancer() -> ResourceDescriptor {
    let route_pool = AttributeType::block([
        AttributeSchema::new("pool", object_ref()).required(),
        AttributeSchema::new("weight", AttributeType::Int),
        AttributeSchema::new("priority", AttributeType::Int),
    ]);

    let schema = ResourceSchema::with_common_attributes("http_loadbalancer")
        .with_description("HTTP load balancer")
        .attribute(
            AttributeSchema::new("domains", AttributeType::List(Box::new(types::domain())))
                .required(),
        )
        .attribute(
            AttributeSchema::new(
                "http",
                AttributeType::block([
                    AttributeSchema::new("dns_volterra_managed", AttributeType::Bool),
                    AttributeSchema::new("port", types::port()),
                ]),
            )
            .conflicts_with("https_auto_cert"),
        )
        .attribute(AttributeSchema::new(
            "https_auto_cert",
            AttributeType::block([
                AttributeSchema::new("http_redirect", AttributeType::Bool),
                AttributeSchema::new("add_hsts", AttributeType::Bool),
                AttributeSchema::new("port", types::port()),
            ]),
        ))
        .attribute(AttributeSchema::new(
            "default_route_pools",
            AttributeType::List(Box::new(route_pool)),
        ))
        .attribute(
            AttributeSchema::new("advertise_on_public_default_vip", empty_block())
                .conflicts_with("do_not_advertise"),
        )
        .attribute(AttributeSchema::new("do_not_advertise", empty_block()))
        .attribute(AttributeSchema::new("app_firewall", object_ref()).conflicts_with("disable_waf"))
        .attribute(AttributeSchema::new("disable_waf", empty_block()))
        .attribute(AttributeSchema::new("add_location", AttributeType::Bool).optional_computed())
        .attribute(
            AttributeSchema::new("host_name", AttributeType::String)
                .computed()
                .with_description("Auto-generated host name"),
        )
        .attribute(
            AttributeSchema::new("cname", AttributeType::String)
                .computed()
                .with_wire_name("auto_cert_info_cname"),
        );

    descriptor("http_loadbalancer", "http_loadbalancers", schema)
}

fn app_firewall() -> ResourceDescriptor {
    let schema = ResourceSchema::with_common_attributes("app_firewall")
        .with_description("Web application firewall policy")
        .attribute(AttributeSchema::new("blocking", empty_block()).conflicts_with("monitoring"))
        .attribute(AttributeSchema::new("monitoring", empty_block()))
        .attribute(AttributeSchema::new("default_detection_settings", empty_block()))
        .attribute(AttributeSchema::new("default_bot_setting", empty_block()))
        .attribute(AttributeSchema::new("allow_all_response_codes", empty_block()))
        .attribute(AttributeSchema::new(
            "blocking_page",
            AttributeType::block([
                AttributeSchema::new("blocking_page", AttributeType::String),
                AttributeSchema::new("response_code", AttributeType::String),
            ]),
        ));

    descriptor("app_firewall", "app_firewalls", schema)
}

fn known_label() -> ResourceDescriptor {
    let schema = ResourceSchema::with_common_attributes("known_label")
        .with_description("Label key/value pair known to the tenant")
        .attribute(
            AttributeSchema::new("key", AttributeType::String)
                .required()
                .requires_replace(),
        )
        .attribute(
            AttributeSchema::new("value", AttributeType::String)
                .required()
                .requires_replace(),
        );

    descriptor("known_label", "known_labels", schema)
}

fn addon_subscription() -> ResourceDescriptor {
    let schema = ResourceSchema::with_common_attributes("addon_subscription")
        .with_description("Subscription to an addon service")
        .attribute(
            AttributeSchema::new("addon_service", object_ref())
                .required()
                .requires_replace(),
        )
        .attribute(
            AttributeSchema::new(
                "tier",
                AttributeType::enumeration(&["NO_TIER", "BASIC", "STANDARD", "ADVANCED", "PREMIUM"]),
            )
            .optional_computed()
            .with_zero_default("NO_TIER"),
        )
        .attribute(AttributeSchema::new("status", AttributeType::String).computed());

    descriptor("addon_subscription", "addon_subscriptions", schema)
}

fn aws_vpc_site() -> ResourceDescriptor {
    let schema = ResourceSchema::with_common_attributes("aws_vpc_site")
        .with_description("Customer edge site deployed into an AWS VPC")
        .attribute(
            AttributeSchema::new("aws_region", AttributeType::String)
                .required()
                .requires_replace(),
        )
        .attribute(AttributeSchema::new("aws_cred", object_ref()).required())
        .attribute(
            AttributeSchema::new("instance_type", AttributeType::String)
                .required()
                .requires_replace(),
        )
        .attribute(
            AttributeSchema::new(
                "vpc",
                AttributeType::block([
                    AttributeSchema::new("vpc_id", AttributeType::String),
                    AttributeSchema::new(
                        "new_vpc",
                        AttributeType::block([
                            AttributeSchema::new("name_tag", AttributeType::String),
                            AttributeSchema::new("primary_ipv4", AttributeType::String).required(),
                        ]),
                    ),
                ]),
            )
            .requires_replace(),
        )
        .attribute(AttributeSchema::new("ssh_key", AttributeType::String))
        .attribute(AttributeSchema::new("disk_size", AttributeType::Int).optional_computed())
        .attribute(AttributeSchema::new("site_state", AttributeType::String).computed());

    descriptor("aws_vpc_site", "aws_vpc_sites", schema)
}

fn k8s_cluster() -> ResourceDescriptor {
    let schema = ResourceSchema::with_common_attributes("k8s_cluster")
        .with_description("Kubernetes cluster configuration for an App Stack site")
        .attribute(AttributeSchema::new("use_default_cluster_roles", empty_block()))
        .attribute(AttributeSchema::new("use_default_cluster_role_bindings", empty_block()))
        .attribute(AttributeSchema::new("use_default_psp", empty_block()))
        .attribute(AttributeSchema::new("cluster_scoped_access_deny", empty_block()))
        .attribute(AttributeSchema::new("no_local_access", empty_block()))
        .attribute(AttributeSchema::new("no_insecure_registries", empty_block()));

    descriptor("k8s_cluster", "k8s_clusters", schema)
}

fn cloud_credentials() -> ResourceDescriptor {
    let secret = AttributeType::block([
        AttributeSchema::new(
            "clear_secret_info",
            AttributeType::block([
                AttributeSchema::new("url", AttributeType::String).required(),
                AttributeSchema::new("provider", AttributeType::String),
            ]),
        ),
        AttributeSchema::new(
            "blindfold_secret_info",
            AttributeType::block([
                AttributeSchema::new("location", AttributeType::String).required(),
            ]),
        ),
    ]);

    let schema = ResourceSchema::with_common_attributes("cloud_credentials")
        .with_description("Credentials used to deploy sites into a cloud account")
        .attribute(
            AttributeSchema::new(
                "aws_secret_key",
                AttributeType::block([
                    AttributeSchema::new("access_key", AttributeType::String).required(),
                    AttributeSchema::new("secret_key", secret.clone()).required(),
                ]),
            )
            .conflicts_with("gcp_cred_file"),
        )
        .attribute(AttributeSchema::new(
            "gcp_cred_file",
            AttributeType::block([
                AttributeSchema::new("credential_file", secret).required(),
            ]),
        ));

    descriptor("cloud_credentials", "cloud_credentialss", schema)
}

/// All built-in descriptors
pub fn builtin_descriptors() -> Vec<ResourceDescriptor> {
    vec![
        addon_subscription(),
        app_firewall(),
        aws_vpc_site(),
        cloud_credentials(),
        healthcheck(),
        http_loadbalancer(),
        k8s_cluster(),
        known_label(),
        origin_pool(),
    ]
}

/// Registry pre-loaded with the built-in descriptors
pub fn builtin_registry() -> DescriptorRegistry {
    builtin_descriptors()
        .into_iter()
        .fold(DescriptorRegistry::new(), DescriptorRegistry::with)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;

    #[test]
    fn categories() {
        assert_eq!(category_for("aws_vpc_site"), TimeoutCategory::LongRunning);
        assert_eq!(category_for("virtual_k8s"), TimeoutCategory::LongRunning);
        assert_eq!(category_for("cloud_credentials"), TimeoutCategory::Critical);
        assert_eq!(category_for("healthcheck"), TimeoutCategory::Standard);
    }

    #[test]
    fn registry_holds_every_builtin() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), builtin_descriptors().len());
        assert_eq!(
            registry.get("k8s_cluster").unwrap().timeout_category,
            TimeoutCategory::LongRunning
        );
        assert_eq!(
            registry.get("origin_pool").unwrap().collection_path("shared"),
            "/api/config/namespaces/shared/origin_pools"
        );
    }

    #[test]
    fn every_builtin_has_identity_attributes() {
        for descriptor in builtin_descriptors() {
            let schema = &descriptor.schema;
            for attr in ["name", "namespace", "id", "labels", "annotations"] {
                assert!(
                    schema.get(attr).is_some(),
                    "{} is missing {}",
                    descriptor.type_name,
                    attr
                );
            }
            assert!(schema.get("name").unwrap().requires_replace);
            assert!(schema.get("namespace").unwrap().requires_replace);
        }
    }

    #[test]
    fn conflicts_reference_known_attributes() {
        for descriptor in builtin_descriptors() {
            for attr in descriptor.schema.attributes.values() {
                for other in &attr.conflicts_with {
                    assert!(
                        descriptor.schema.get(other).is_some(),
                        "{}.{} conflicts with unknown {}",
                        descriptor.type_name,
                        attr.name,
                        other
                    );
                }
            }
        }
    }

    #[test]
    fn ports_and_domains_are_checked() {
        let registry = builtin_registry();

        let pool = &registry.get("origin_pool").unwrap().schema;
        let port = &pool.get("port").unwrap().attr_type;
        assert!(port.validate(&Value::Int(8080)).is_ok());
        assert!(port.validate(&Value::Int(70000)).is_err());

        let lb = &registry.get("http_loadbalancer").unwrap().schema;
        let domains = &lb.get("domains").unwrap().attr_type;
        assert!(domains
            .validate(&Value::List(vec![Value::from("*.example.com")]))
            .is_ok());
        assert!(domains
            .validate(&Value::List(vec![Value::from("not a domain")]))
            .is_err());
    }
}
