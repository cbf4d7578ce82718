// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::StreamError;
use sluice_stream::junctions::{
    Balance, Broadcast, Concat, Merge, Partition, Unzip, UnzipWith3, ZipN,
};
use sluice_stream::prelude::*;
use parking_lot::Mutex;
use sluice_test_utils::{await_within, test_error};
use std::sync::Arc;

#[tokio::test]
async fn test_balance_delivers_each_element_to_the_demanding_outlet() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(vec![1, 2, 3]));
    let (balance, _) = builder.add_stage(Balance::<i32>::new(2));
    let (a, a_key) = builder.add_sink(Sink::queue());
    let (b, b_key) = builder.add_sink(Sink::queue());
    builder.connect(source, balance.inlet);
    builder.connect(balance.outlets[0], a);
    builder.connect(balance.outlets[1], b);
    let (a, b) = builder
        .build_closed_with(move |values| Ok((values.take(a_key)?, values.take(b_key)?)))
        .run_with(&materializer)?;

    // Act
    let a_first = await_within(1_000, a.pull()).await?;
    let b_first = await_within(1_000, b.pull()).await?;
    let b_second = await_within(1_000, b.pull()).await?;
    let b_end = await_within(1_000, b.pull()).await?;
    let a_end = await_within(1_000, a.pull()).await?;

    // Assert
    assert_eq!(a_first, Some(1));
    assert_eq!((b_first, b_second), (Some(2), Some(3)));
    assert_eq!(b_end, None);
    assert_eq!(a_end, None);
    Ok(())
}

#[tokio::test]
async fn test_balance_keeps_serving_remaining_outlets_after_a_cancel() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=20));
    let (balance, _) = builder.add_stage(Balance::<i32>::new(2));
    let (cancelled, _) = builder.add_sink(Sink::cancelled());
    let (seq, seq_key) = builder.add_sink(Sink::seq());
    builder.connect(source, balance.inlet);
    builder.connect(balance.outlets[0], cancelled);
    builder.connect(balance.outlets[1], seq);
    let graph = builder.build_closed_with(move |values| values.take(seq_key));

    // Act
    let result = await_within(1_000, graph.run_with(&materializer)?).await?;

    // Assert
    assert_eq!(result, (1..=20).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_balance_waiting_for_all_downstreams() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=4));
    let (balance, _) = builder.add_stage(Balance::<i32>::wait_for_all_downstreams(2));
    let (a, a_key) = builder.add_sink(Sink::queue());
    let (b, b_key) = builder.add_sink(Sink::queue());
    builder.connect(source, balance.inlet);
    builder.connect(balance.outlets[0], a);
    builder.connect(balance.outlets[1], b);
    let (a, b) = builder
        .build_closed_with(move |values| Ok((values.take(a_key)?, values.take(b_key)?)))
        .run_with(&materializer)?;

    // Act
    let mut a_pull = Box::pin(a.pull());
    sluice_test_utils::assert_pending_for(&mut a_pull, 50).await;
    let b_first = await_within(1_000, b.pull()).await?;
    let a_first = await_within(1_000, a_pull).await?;

    // Assert
    let mut delivered = vec![a_first, b_first];
    delivered.sort_unstable();
    assert_eq!(delivered, vec![Some(1), Some(2)]);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_delivers_every_element_to_every_outlet() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=5));
    let (broadcast, _) = builder.add_stage(Broadcast::<i32>::new(3));
    let mut keys = Vec::new();
    for outlet in broadcast.outlets.clone() {
        let (inlet, key) = builder.add_sink(Sink::seq());
        builder.connect(outlet, inlet);
        keys.push(key);
    }
    builder.connect(source, broadcast.inlet);
    let graph = builder.build_closed_with(move |values| {
        keys.iter().map(|&key| values.take(key)).collect::<sluice_core::Result<Vec<_>>>()
    });

    // Act
    let completions = graph.run_with(&materializer)?;
    let mut results = Vec::new();
    for completion in completions {
        results.push(await_within(1_000, completion).await?);
    }

    // Assert
    for result in results {
        assert_eq!(result, vec![1, 2, 3, 4, 5]);
    }
    Ok(())
}

#[tokio::test]
async fn test_broadcast_continues_after_one_outlet_cancels() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=5));
    let (broadcast, _) = builder.add_stage(Broadcast::<i32>::new(2));
    let (head, _) = builder.add_flow(Flow::new().take(1));
    let (first, first_key) = builder.add_sink(Sink::seq());
    let (all, all_key) = builder.add_sink(Sink::seq());
    builder.connect(source, broadcast.inlet);
    builder.connect(broadcast.outlets[0], head.inlet);
    builder.connect(head.outlet, first);
    builder.connect(broadcast.outlets[1], all);
    let (first, all) = builder
        .build_closed_with(move |values| Ok((values.take(first_key)?, values.take(all_key)?)))
        .run_with(&materializer)?;

    // Act
    let first = await_within(1_000, first).await?;
    let all = await_within(1_000, all).await?;

    // Assert
    assert_eq!(first, vec![1]);
    assert_eq!(all, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn test_partition_routes_by_index() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=9));
    let (partition, _) = builder.add_stage(Partition::new(3, |x: &i32| (*x % 3) as usize));
    let mut keys = Vec::new();
    for outlet in partition.outlets.clone() {
        let (inlet, key) = builder.add_sink(Sink::seq());
        builder.connect(outlet, inlet);
        keys.push(key);
    }
    builder.connect(source, partition.inlet);
    let graph = builder.build_closed_with(move |values| {
        keys.iter().map(|&key| values.take(key)).collect::<sluice_core::Result<Vec<_>>>()
    });

    // Act
    let mut results = Vec::new();
    for completion in graph.run_with(&materializer)? {
        results.push(await_within(1_000, completion).await?);
    }

    // Assert
    assert_eq!(results, vec![vec![3, 6, 9], vec![1, 4, 7], vec![2, 5, 8]]);
    Ok(())
}

#[tokio::test]
async fn test_partition_fails_on_out_of_range_index() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=3));
    let (partition, _) = builder.add_stage(Partition::new(2, |x: &i32| *x as usize));
    let (low, low_key) = builder.add_sink(Sink::seq());
    let (high, _) = builder.add_sink(Sink::ignore());
    builder.connect(source, partition.inlet);
    builder.connect(partition.outlets[0], low);
    builder.connect(partition.outlets[1], high);
    let graph = builder.build_closed_with(move |values| values.take(low_key));

    // Act
    let result = await_within(1_000, graph.run_with(&materializer)?).await;

    // Assert
    assert!(matches!(result, Err(StreamError::StreamProcessingError { .. })));
    Ok(())
}

#[tokio::test]
async fn test_unzip_splits_pairs() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(vec![(1, 'a'), (2, 'b')]));
    let (unzip, _) = builder.add_stage(Unzip::<i32, char>::new());
    let (numbers, numbers_key) = builder.add_sink(Sink::seq());
    let (letters, letters_key) = builder.add_sink(Sink::seq());
    builder.connect(source, unzip.inlet);
    builder.connect(unzip.out0, numbers);
    builder.connect(unzip.out1, letters);
    let (numbers, letters) = builder
        .build_closed_with(move |values| {
            Ok((values.take(numbers_key)?, values.take(letters_key)?))
        })
        .run_with(&materializer)?;

    // Act
    let numbers = await_within(1_000, numbers).await?;
    let letters = await_within(1_000, letters).await?;

    // Assert
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(letters, vec!['a', 'b']);
    Ok(())
}

#[tokio::test]
async fn test_unzip_with3_projects_each_element() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=3));
    let (unzip, _) = builder.add_stage(UnzipWith3::new(|x: i32| (x, x * x, x.to_string())));
    let (plain, plain_key) = builder.add_sink(Sink::seq());
    let (squares, squares_key) = builder.add_sink(Sink::seq());
    let (text, text_key) = builder.add_sink(Sink::seq());
    builder.connect(source, unzip.inlet);
    builder.connect(unzip.out0, plain);
    builder.connect(unzip.out1, squares);
    builder.connect(unzip.out2, text);
    let (plain, squares, text) = builder
        .build_closed_with(move |values| {
            Ok((
                values.take(plain_key)?,
                values.take(squares_key)?,
                values.take(text_key)?,
            ))
        })
        .run_with(&materializer)?;

    // Act & Assert
    assert_eq!(await_within(1_000, plain).await?, vec![1, 2, 3]);
    assert_eq!(await_within(1_000, squares).await?, vec![1, 4, 9]);
    assert_eq!(await_within(1_000, text).await?, vec!["1", "2", "3"]);
    Ok(())
}

#[tokio::test]
async fn test_eager_merge_completes_with_the_first_finished_input() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (finite, _) = builder.add_source(Source::from_iter(vec![1, 2]));
    let (infinite, _) = builder.add_source(Source::repeat(0));
    let (merge, _) = builder.add_stage(Merge::<i32>::eager(2));
    let (sink, key) = builder.add_sink(Sink::seq());
    builder.connect(finite, merge.inlets[0]);
    builder.connect(infinite, merge.inlets[1]);
    builder.connect(merge.out, sink);
    let graph = builder.build_closed_with(move |values| values.take(key));

    // Act
    let result = await_within(1_000, graph.run_with(&materializer)?).await?;

    // Assert
    assert!(result.contains(&1));
    assert!(result.contains(&2));
    Ok(())
}

#[tokio::test]
async fn test_concat_of_three_inputs() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (concat, _) = builder.add_stage(Concat::<i32>::new(3));
    for (index, range) in [(0, 1..=2), (1, 3..=3), (2, 4..=5)] {
        let (source, _) = builder.add_source(Source::from_iter(range));
        builder.connect(source, concat.inlets[index]);
    }
    let (sink, key) = builder.add_sink(Sink::seq());
    builder.connect(concat.out, sink);
    let graph = builder.build_closed_with(move |values| values.take(key));

    // Act
    let result = await_within(1_000, graph.run_with(&materializer)?).await?;

    // Assert
    assert_eq!(result, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn test_concat_reports_a_later_failure_after_draining_earlier_inputs() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    // Act
    let result = Source::from_iter(vec![1, 2])
        .concat(Source::failed(test_error("broken")))
        .concat(Source::single(3))
        .run_with(
            Sink::for_each(move |x| recorder.lock().push(x)),
            &materializer,
        )?;
    let result = await_within(1_000, result).await;

    // Assert
    assert_eq!(*seen.lock(), vec![1, 2]);
    assert_eq!(
        result.err().map(|e| e.to_string()),
        Some("User error: test error: broken".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_zip_n_stage_in_a_custom_graph() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (zip, _) = builder.add_stage(ZipN::<char>::new(2));
    let (left, _) = builder.add_source(Source::from_iter(vec!['a', 'b']));
    let (right, _) = builder.add_source(Source::from_iter(vec!['x', 'y', 'z']));
    builder.connect(left, zip.inlets[0]);
    builder.connect(right, zip.inlets[1]);
    let source = builder.build_source(zip.out);

    // Act
    let result = source.run_with(Sink::seq(), &materializer)?.await?;

    // Assert
    assert_eq!(result, vec![vec!['a', 'x'], vec!['b', 'y']]);
    Ok(())
}
