#![allow(clippy::uninlined_format_args)]
//! 服务容器的性能基准测试

use appkernel::config::{RuntimeMode, Settings};
use appkernel::infrastructure::{ContainerBuilder, ProviderFactory, ServiceContainer};
use appkernel::action::RequestContext;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

/// 测试用的简单服务
struct SimpleService {
    value: i32,
}

/// 依赖简单服务的服务
struct DependentService {
    inner: Arc<SimpleService>,
}

fn default_container() -> ServiceContainer {
    let container = ContainerBuilder::new().build();
    ProviderFactory::new(Arc::new(Settings::default()), RuntimeMode::Cli)
        .register_default_providers(&container)
        .unwrap();
    container
}

/// 基准测试：已缓存单例的解析
fn bench_cached_resolution(c: &mut Criterion) {
    let container = ServiceContainer::new();
    container
        .register_singleton(|_| Ok(Arc::new(SimpleService { value: 42 })))
        .unwrap();
    container
        .register_singleton(|r| {
            Ok(Arc::new(DependentService {
                inner: r.resolve::<SimpleService>()?,
            }))
        })
        .unwrap();
    container.resolve::<DependentService>().unwrap();

    c.bench_function("cached_singleton_resolution", |b| {
        b.iter(|| {
            let service = container.resolve::<DependentService>().unwrap();
            black_box(service.inner.value)
        })
    });
}

/// 基准测试：首次解析（包含工厂调用）
fn bench_cold_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_resolution");

    for resolutions in [1, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(resolutions),
            resolutions,
            |b, &resolutions| {
                b.iter(|| {
                    let container = ServiceContainer::new();
                    container
                        .register_singleton(|_| Ok(Arc::new(SimpleService { value: 1 })))
                        .unwrap();
                    let mut total = 0;
                    for _ in 0..resolutions {
                        total += container.resolve::<SimpleService>().unwrap().value;
                    }
                    black_box(total)
                })
            },
        );
    }
    group.finish();
}

/// 基准测试：每个请求组装一次上下文
fn bench_request_context(c: &mut Criterion) {
    let container = default_container();

    c.bench_function("request_context_assembly", |b| {
        b.iter(|| {
            let scope = container.begin_scope();
            let ctx = RequestContext::from_scope(&scope).unwrap();
            black_box(ctx.request_id())
        })
    });
}

criterion_group!(
    benches,
    bench_cached_resolution,
    bench_cold_resolution,
    bench_request_context
);
criterion_main!(benches);
