//! Shared wgpu boilerplate helpers for the trail compute kernels.

/// Invocations per workgroup for every 1D trail kernel. Must match
/// `@workgroup_size` in the WGSL sources.
pub const WORKGROUP_SIZE: u32 = 64;

/// Workgroups needed to cover `invocations` threads.
#[must_use]
pub fn workgroup_count(invocations: u32) -> u32 {
    invocations.div_ceil(WORKGROUP_SIZE)
}

/// Largest workgroup count wgpu accepts in one dispatch dimension with
/// default limits.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

/// `[x, y]` workgroup grid covering `invocations` threads when a 1D
/// dispatch would exceed [`MAX_WORKGROUPS_PER_DIMENSION`]. Kernels recover
/// the linear index as `id.x + id.y * num_workgroups.x * WORKGROUP_SIZE`.
#[must_use]
pub fn workgroup_grid(invocations: u32) -> [u32; 2] {
    let groups = workgroup_count(invocations);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        return [groups, 1];
    }
    [
        MAX_WORKGROUPS_PER_DIMENSION,
        groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION),
    ]
}

/// Compute-visible storage buffer binding.
pub fn storage_buffer(
    binding: u32,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compute-visible uniform buffer binding.
pub fn uniform_buffer(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compute-visible uniform buffer binding addressed with a dynamic offset;
/// `size` is the byte size of one element.
pub fn dynamic_uniform_buffer(
    binding: u32,
    size: u64,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

/// Bind group layout from a list of entries.
pub fn bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{label} Bind Group Layout")),
        entries,
    })
}

/// Bind group whose entry `i` binds the whole of `buffers[i]` at binding `i`.
pub fn buffer_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(i, buffer)| wgpu::BindGroupEntry {
            binding: i as u32,
            resource: buffer.as_entire_binding(),
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} Bind Group")),
        layout,
        entries: &entries,
    })
}

/// Create a compute pipeline for `entry_point` with a single bind group.
pub fn create_compute_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::ComputePipeline {
    let pipeline_layout =
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{entry_point} Pipeline Layout")),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{entry_point} Pipeline")),
        layout: Some(&pipeline_layout),
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Record one compute pass running `pipeline` over `workgroups` groups.
pub fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    workgroups: u32,
) {
    if workgroups == 0 {
        return;
    }
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Record one compute pass whose workgroup count is read from
/// `indirect_buffer` at `indirect_offset` on the GPU timeline.
pub fn dispatch_indirect(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    indirect_buffer: &wgpu::Buffer,
    indirect_offset: u64,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups_indirect(indirect_buffer, indirect_offset);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(64), 1);
        assert_eq!(workgroup_count(65), 2);
        assert_eq!(workgroup_count(640), 10);
    }

    #[test]
    fn workgroup_grid_covers_large_dispatches() {
        assert_eq!(workgroup_grid(0), [0, 1]);
        assert_eq!(workgroup_grid(640), [10, 1]);

        let invocations = 64 * MAX_WORKGROUPS_PER_DIMENSION + 1;
        let [x, y] = workgroup_grid(invocations);
        assert!(x <= MAX_WORKGROUPS_PER_DIMENSION);
        assert!(u64::from(x) * u64::from(y) * u64::from(WORKGROUP_SIZE) >= u64::from(invocations));
    }
}
