use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use warden_auth::{Action, Argon2Hasher, NewTenant, NewUser, PasswordPolicy, ResourceType, TenantStatus, TokenSubject};
use warden_core::{Clock, RequestContext, SystemClock, TenantId, UserId};
use warden_infra::{
    InMemoryCredentialStore, PermissionResolutionEngine, Repositories, SystemAdminSeed, TenantProvisioningSaga,
    TokenLifecycleManager, TokenSettings, UserDirectory, seed_system_tenant,
};

struct Fixture {
    ctx: RequestContext,
    engine: PermissionResolutionEngine,
    users: Arc<UserDirectory>,
    tenant_id: TenantId,
    admin_id: UserId,
}

fn fixture() -> Fixture {
    let ctx = RequestContext::background();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repos = Repositories::in_memory();
    let hasher = Arc::new(Argon2Hasher::with_cost(1024, 1).unwrap());
    let users = Arc::new(UserDirectory::new(&repos, hasher, PasswordPolicy::default(), clock.clone()));
    let saga = TenantProvisioningSaga::new(repos.clone(), users.clone(), clock.clone());
    let seeded = seed_system_tenant(
        &ctx,
        &repos,
        &saga,
        SystemAdminSeed {
            email: "root@system.bench".into(),
            password: None,
        },
    )
    .unwrap();
    let defaults = saga
        .provision(
            &ctx,
            NewTenant {
                id: None,
                name: "bench".into(),
                status: TenantStatus::Active,
                admin_email: "admin@bench.test".into(),
                admin_password: "Bench-Password-1!".into(),
            },
            None,
        )
        .unwrap();
    Fixture {
        engine: PermissionResolutionEngine::new(&repos, clock, seeded.identity),
        ctx,
        users,
        tenant_id: defaults.tenant_id,
        admin_id: defaults.user_id,
    }
}

fn every_permission() -> Vec<String> {
    ResourceType::ALL
        .iter()
        .flat_map(|r| Action::ALL.iter().map(move |a| format!("{}:{}", r.as_str(), a.as_str())))
        .collect()
}

fn bench_permission_checks(c: &mut Criterion) {
    let f = fixture();
    let mut group = c.benchmark_group("permission_checks");

    group.bench_function("wildcard_holder_single", |b| {
        b.iter(|| {
            f.engine
                .has_permission(&f.ctx, f.tenant_id, f.admin_id, black_box("order:read"), f.tenant_id)
                .unwrap()
        });
    });

    // Direct grants: resolution cost grows with the user's grant list.
    let all = every_permission();
    for grants in [1usize, 10, 50] {
        let user = f
            .users
            .create_user(
                &f.ctx,
                f.tenant_id,
                NewUser {
                    email: format!("grants{grants}@bench.test"),
                    password: "Bench-Password-1!".into(),
                    ..NewUser::default()
                },
                None,
            )
            .unwrap();
        for permission in all.iter().filter(|p| !p.contains('*')).take(grants) {
            f.users
                .grant_permission(&f.ctx, f.tenant_id, user.id, permission)
                .unwrap();
        }
        group.throughput(Throughput::Elements(all.len() as u64));
        group.bench_with_input(BenchmarkId::new("batch_check", grants), &user.id, |b, &user_id| {
            b.iter(|| black_box(f.engine.check_permissions(&f.ctx, f.tenant_id, user_id, &all).unwrap()));
        });
    }

    group.finish();
}

fn bench_token_lifecycle(c: &mut Criterion) {
    let ctx = RequestContext::background();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let manager = TokenLifecycleManager::new(
        Arc::new(InMemoryCredentialStore::with_clock(clock.clone())),
        clock,
        TokenSettings::new("bench-secret"),
    );
    let subject = TokenSubject {
        tenant_id: TenantId::new(),
        user_id: UserId::new(),
        username: "bench".into(),
        email: "bench@bench.test".into(),
        roles: Vec::new(),
    };

    let mut group = c.benchmark_group("token_lifecycle");

    group.bench_function("issue_pair", |b| {
        b.iter(|| black_box(manager.issue_pair(&ctx, &subject, Vec::new()).unwrap()));
    });

    let pair = manager.issue_pair(&ctx, &subject, Vec::new()).unwrap();
    group.bench_function("validate_access", |b| {
        b.iter(|| black_box(manager.validate_access_token(&ctx, black_box(&pair.access.token)).unwrap()));
    });

    group.bench_function("rotate_refresh", |b| {
        let mut refresh = manager.issue_pair(&ctx, &subject, Vec::new()).unwrap().refresh.token;
        b.iter(|| {
            let next = manager
                .rotate_refresh_token(&ctx, &subject, &refresh, Some(subject.user_id))
                .unwrap();
            refresh = next.refresh.token;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_permission_checks, bench_token_lifecycle);
criterion_main!(benches);
