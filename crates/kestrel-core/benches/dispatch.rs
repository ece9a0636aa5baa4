use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kestrel_core::{Class, ClassBuilder, Function, Property, Runtime, Table, Value};

#[derive(Default)]
struct Geometry {
    width: i64,
}

/// Chain of `depth` classes below the root; the property lives on the root
fn deep_chain(rt: &Runtime, depth: usize) -> Class {
    rt.root_class()
        .add_property(
            Property::new("width")
                .on_read(|_, obj| {
                    Ok(Value::from(
                        obj.data::<Geometry>().map_or(0, |g| g.width),
                    ))
                })
                .on_assign(|_, obj, value| {
                    if let Some(mut g) = obj.data_mut::<Geometry>() {
                        g.width = value.as_integer().unwrap_or(0);
                    }
                    Ok(())
                }),
        )
        .unwrap();

    let mut class = rt
        .register_class(ClassBuilder::new("level0").payload::<Geometry>())
        .unwrap();
    for level in 1..depth {
        class = rt
            .register_class(ClassBuilder::new(&format!("level{}", level)).parent(&class))
            .unwrap();
    }
    class
}

fn bench_property_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_read");

    for depth in [1usize, 4, 16] {
        let rt = Runtime::new();
        let class = deep_chain(&rt, depth);
        let obj = rt.construct(&class, None).unwrap();
        group.bench_with_input(BenchmarkId::new("depth", depth), &obj, |b, obj| {
            b.iter(|| rt.read(black_box(obj), "width").unwrap());
        });
    }

    group.finish();
}

fn bench_property_write(c: &mut Criterion) {
    let rt = Runtime::new();
    let class = deep_chain(&rt, 4);
    let obj = rt.construct(&class, None).unwrap();

    c.bench_function("property_write", |b| {
        b.iter(|| rt.write(&obj, "width", black_box(800)).unwrap());
    });
}

fn bench_construct(c: &mut Criterion) {
    let rt = Runtime::new();
    let class = deep_chain(&rt, 4);
    let props = Table::from_pairs([("width", 640)]);

    c.bench_function("construct_with_props", |b| {
        b.iter(|| rt.construct(&class, Some(black_box(&props))).unwrap());
    });
}

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");

    for handlers in [1usize, 8, 64] {
        let rt = Runtime::new();
        let class = rt.register_class(ClassBuilder::new("tag")).unwrap();
        let obj = rt.construct(&class, None).unwrap();
        for _ in 0..handlers {
            class.connect_signal("property::selected", Function::new(|_, _| Ok(Value::Nil)));
        }
        group.bench_with_input(BenchmarkId::new("class_handlers", handlers), &obj, |b, obj| {
            b.iter(|| obj.emit_property_changed(&rt, black_box("selected")).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_property_read,
    bench_property_write,
    bench_construct,
    bench_emit
);
criterion_main!(benches);
