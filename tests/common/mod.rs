//! Shared helpers for the compiler integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use render_graph_compiler::{
    AliasingGroup, CompiledGraph, PassHandle, QueueIndex, RenderGraphBuilder, ResourceState,
};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Handles of the passes in [`frame_graph`].
pub struct FramePasses {
    pub shadow: PassHandle,
    pub lighting: PassHandle,
    pub postprocess: PassHandle,
}

/// Shadow and lighting on the graphics queue, postprocess on queue 1.
pub fn frame_graph(builder: &mut RenderGraphBuilder) -> FramePasses {
    let shadow = builder.add_pass("Shadow", 0, false);
    let lighting = builder.add_pass("Lighting", 0, false);
    let postprocess = builder.add_pass("Postprocess", 1, false);

    builder.add_write_dependency(shadow, "ShadowMap", 0).unwrap();
    builder.add_read_dependency(lighting, "ShadowMap", 0).unwrap();
    builder.add_write_dependency(lighting, "ColorBuffer", 0).unwrap();
    builder
        .add_read_dependency(postprocess, "ColorBuffer", 0)
        .unwrap();

    builder
        .request_resource_state("ShadowMap", shadow, ResourceState::DEPTH_WRITE)
        .unwrap();
    builder
        .request_resource_state("ShadowMap", lighting, ResourceState::PIXEL_SHADER_RESOURCE)
        .unwrap();
    builder
        .request_resource_state("ColorBuffer", lighting, ResourceState::RENDER_TARGET)
        .unwrap();
    builder
        .request_resource_state(
            "ColorBuffer",
            postprocess,
            ResourceState::NON_PIXEL_SHADER_RESOURCE,
        )
        .unwrap();

    builder
        .request_allocation("ShadowMap", 16 << 20, AliasingGroup::RenderTargetsAndDepthStencils)
        .unwrap();
    builder
        .request_allocation("ColorBuffer", 32 << 20, AliasingGroup::RenderTargetsAndDepthStencils)
        .unwrap();

    FramePasses {
        shadow,
        lighting,
        postprocess,
    }
}

/// Check that every cross-queue dependency is ordered by some chain of waits.
///
/// A consumer is ordered after a producer if it, or an earlier pass on its
/// own queue, waits on the producer's queue at or past the producer's local
/// index, directly or through the waits of the awaited passes.
pub fn assert_sync_sufficient(builder: &RenderGraphBuilder, compiled: &CompiledGraph) {
    // Reached local index per queue, per pass, in execution order.
    let mut reached: Vec<BTreeMap<QueueIndex, usize>> = vec![BTreeMap::new(); builder.pass_count()];
    let mut previous_on_queue: BTreeMap<QueueIndex, PassHandle> = BTreeMap::new();

    for &handle in compiled.execution_order() {
        let pass = compiled.pass(handle).unwrap();
        let mut known = previous_on_queue
            .get(&pass.queue)
            .map(|previous| reached[previous.index()].clone())
            .unwrap_or_default();
        for wait in &pass.waits {
            let awaited = reached[wait.pass.index()].clone();
            for (queue, index) in awaited.into_iter().chain([(wait.queue, wait.local_index)]) {
                let entry = known.entry(queue).or_insert(index);
                *entry = (*entry).max(index);
            }
        }
        known.insert(pass.queue, pass.local_index);
        reached[handle.index()] = known;
        previous_on_queue.insert(pass.queue, handle);
    }

    for (consumer, reader) in builder.passes().iter().enumerate() {
        for name in reader.reads() {
            let Some(producer) = builder.writer(*name) else {
                continue;
            };
            if producer.index() == consumer {
                continue;
            }
            let producer = compiled.pass(producer).unwrap();
            let covered = reached[consumer]
                .get(&producer.queue)
                .is_some_and(|&index| index >= producer.local_index);
            assert!(
                covered,
                "'{}' is not ordered after its producer '{}'",
                reader.name(),
                producer.name
            );
        }
    }
}
