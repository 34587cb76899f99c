//! Descriptor passes over larger block sets: parallel and sequential paths
//! must agree, and the sparse mass matrix must match the dense reference.

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use varblock_core::{BlockError, DescriptorConfig, PointMassBlock, SparseSink, VariableDescriptor};

fn build(count: usize, config: DescriptorConfig) -> VariableDescriptor {
    let mut descriptor = VariableDescriptor::with_config(config).expect("valid config");
    for i in 0..count {
        let mass = 0.5 + (i % 17) as f64 * 0.25;
        let id = descriptor.insert(PointMassBlock::with_mass(mass).expect("valid mass"));
        if i % 5 == 3 {
            descriptor.set_active(id, false);
        }
    }
    descriptor.update_offsets();
    descriptor
}

fn forced_parallel() -> DescriptorConfig {
    DescriptorConfig::default()
        .with_parallel(true)
        .with_parallel_min_blocks(1)
}

#[test]
fn parallel_and_sequential_products_agree() {
    let sequential = build(1000, DescriptorConfig::sequential());
    let parallel = build(1000, forced_parallel());
    assert_eq!(sequential.total_dofs(), parallel.total_dofs());

    let n = sequential.total_dofs();
    let vect: Vec<f64> = (0..n).map(|i| ((i * 7919) % 101) as f64 - 50.0).collect();

    let mut a = vec![1.0; n];
    let mut b = vec![1.0; n];
    sequential
        .system_product(&mut a, &vect, -0.5)
        .expect("sequential pass");
    parallel
        .system_product(&mut b, &vect, -0.5)
        .expect("parallel pass");
    assert_eq!(a, b);

    let mut a = vec![0.0; n];
    let mut b = vec![0.0; n];
    sequential
        .inverse_mass_product(&mut a, &vect)
        .expect("sequential pass");
    parallel
        .inverse_mass_product(&mut b, &vect)
        .expect("parallel pass");
    assert_eq!(a, b);

    let mut a = vec![0.0; n];
    let mut b = vec![0.0; n];
    sequential.build_diagonal(&mut a, 2.0).expect("sequential pass");
    parallel.build_diagonal(&mut b, 2.0).expect("parallel pass");
    assert_eq!(a, b);
}

#[test]
fn parallel_pass_leaves_tail_of_longer_vectors_alone() {
    let descriptor = build(64, forced_parallel());
    let n = descriptor.total_dofs();
    // constraint rows follow the variables in a full system vector
    let mut result = vec![9.0; n + 10];
    let vect = vec![1.0; n + 10];
    descriptor
        .system_product(&mut result, &vect, 1.0)
        .expect("parallel pass");
    assert!(result[n..].iter().all(|&x| x == 9.0));
}

#[test]
fn mass_matrix_matches_dense_block_sum() {
    let descriptor = build(40, DescriptorConfig::sequential());
    let n = descriptor.total_dofs();

    let mut dense = DMatrix::<f64>::zeros(n, n);
    for (_, block) in descriptor.iter().filter(|(_, b)| b.is_active()) {
        let o = block.offset().expect("active blocks are assigned");
        let m = block.mass_matrix();
        dense
            .view_mut((o, o), (block.dof(), block.dof()))
            .copy_from(&m);
    }

    let csr = descriptor.mass_matrix(1.0).expect("assembly succeeds");
    assert_eq!(csr.nnz(), n);
    for (i, j, &v) in csr.triplet_iter() {
        assert_relative_eq!(v, dense[(i, j)]);
    }

    let mut pasted = DMatrix::<f64>::zeros(n, n);
    descriptor
        .paste_mass_into(&mut pasted, 0, 0, 1.0)
        .expect("paste fits");
    assert_eq!(pasted, dense);
}

#[test]
fn paste_with_row_and_column_offsets() {
    let descriptor = build(4, DescriptorConfig::sequential());
    let n = descriptor.total_dofs();
    let mut sink = DMatrix::<f64>::zeros(n + 2, n + 5);
    descriptor
        .paste_mass_into(&mut sink, 2, 5, 1.0)
        .expect("paste fits");
    assert_eq!(SparseSink::shape(&sink), (n + 2, n + 5));
    assert_eq!(sink[(2, 5)], 0.5);
    assert_eq!(sink[(0, 0)], 0.0);

    let mut small = DMatrix::<f64>::zeros(n, n);
    assert!(matches!(
        descriptor.paste_mass_into(&mut small, 1, 0, 1.0),
        Err(BlockError::DimensionMismatch { .. })
    ));
}

#[test]
fn free_velocities_agree_between_paths() {
    let mut sequential = build(300, DescriptorConfig::sequential());
    let mut parallel = build(300, forced_parallel());
    let n = sequential.total_dofs();
    let forces: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();

    sequential.vector_to_forces(&forces).expect("scatter");
    parallel.vector_to_forces(&forces).expect("scatter");
    sequential.solve_free_velocities().expect("solve");
    parallel.solve_free_velocities().expect("solve");

    let a = sequential.velocities_to_vector().expect("gather");
    let b = parallel.velocities_to_vector().expect("gather");
    assert_eq!(a, b);

    let mut check = vec![0.0; n];
    sequential
        .inverse_mass_product(&mut check, &forces)
        .expect("pass");
    assert_eq!(a.as_slice(), check.as_slice());
}
