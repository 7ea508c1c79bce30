//! Resolution and composition benchmarks
//!
//! Resolves a user with direct and group-derived roles against in-memory
//! directories of growing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cretoai_directory::{DirectoryConfig, DirectoryDomain, Dn, InMemoryDirectory, PathTemplate};
use std::sync::Arc;

fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

/// `archives` archives, each with a few roles; `bench` holds one direct role
/// per archive and sits in a group that holds another
fn seeded_domain(archives: usize) -> DirectoryDomain {
    let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
    for ou in ["Members", "Groups", "Archives"] {
        dir.seed(&dn(&format!("ou={},dc=test", ou)), &["organizationalUnit"], &[("ou", ou)]);
    }
    for user in ["bench", "other"] {
        dir.seed(
            &dn(&format!("cn={},ou=Members,dc=test", user)),
            &["inetOrgPerson"],
            &[("cn", user), ("uid", user)],
        );
    }

    let domain = DirectoryDomain::new(Arc::new(dir), DirectoryConfig::default()).unwrap();
    let provisioner = domain.provisioner();
    provisioner.ensure_global_group("readers", None).unwrap();
    provisioner.assign_user_to_group("bench", "readers").unwrap();

    for i in 0..archives {
        let archive = format!("archive-{}", i);
        provisioner.assign_user_to_role("bench", "Admin", &archive).unwrap();
        provisioner.assign_user_to_role("other", "Editor", &archive).unwrap();
        provisioner.assign_group_to_role("readers", "Reader", &archive).unwrap();
    }

    domain
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_effective_roles");

    for archives in [10, 100, 500].iter() {
        let domain = seeded_domain(*archives);
        group.bench_with_input(BenchmarkId::new("archives", archives), archives, |b, _| {
            b.iter(|| domain.effective_roles(black_box("bench")).unwrap())
        });
    }

    group.finish();
}

fn bench_template(c: &mut Criterion) {
    let template = PathTemplate::new("cn=%s,ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test").unwrap();
    let path = template.compose(&["u1", "Admin", "A1"]).unwrap();

    c.bench_function("template_compose", |b| {
        b.iter(|| template.compose(black_box(&["user, with comma", "Admin", "A1"])).unwrap())
    });
    c.bench_function("template_extract", |b| {
        b.iter(|| template.extract(black_box(&path)).unwrap())
    });
}

criterion_group!(benches, bench_resolve, bench_template);
criterion_main!(benches);
