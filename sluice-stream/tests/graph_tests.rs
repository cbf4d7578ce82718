// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use sluice_core::{Attributes, NotUsed, Result, StreamError};
use sluice_stream::junctions::{Broadcast, Merge};
use sluice_stream::prelude::*;
use sluice_stream::{GraphStage, SourceShape, StageContext, StageLogic};
use sluice_test_utils::await_within;

/// Source that pushes before anyone asked for an element.
struct Eager;

struct EagerLogic {
    shape: SourceShape<i32>,
}

impl StageLogic for EagerLogic {
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.push(self.shape.out, 1)
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        ctx.complete_stage()
    }
}

impl GraphStage for Eager {
    type Shape = SourceShape<i32>;
    type Mat = NotUsed;

    fn shape(&self) -> Self::Shape {
        SourceShape::new()
    }

    fn create_logic(&self, _attributes: &Attributes) -> Result<(Box<dyn StageLogic>, NotUsed)> {
        Ok((Box::new(EagerLogic { shape: self.shape() }), NotUsed))
    }
}

#[tokio::test]
async fn test_unconnected_port_is_rejected() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=3));
    let (broadcast, _) = builder.add_stage(Broadcast::<i32>::new(2));
    let (sink, _) = builder.add_sink(Sink::ignore());
    builder.connect(source, broadcast.inlet);
    builder.connect(broadcast.outlets[0], sink);

    // Act
    let result = builder.build_closed().run_with(&materializer);

    // Assert
    match result {
        Err(StreamError::InvalidGraph { context }) => {
            assert!(context.contains("not connected"), "{context}");
        }
        other => panic!("expected InvalidGraph, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_port_connected_twice_is_rejected() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::from_iter(1..=3));
    let (left, _) = builder.add_sink(Sink::ignore());
    let (right, _) = builder.add_sink(Sink::ignore());
    builder.connect(source, left);
    builder.connect(source, right);

    // Act
    let result = builder.build_closed().run_with(&materializer);

    // Assert
    match result {
        Err(StreamError::InvalidGraph { context }) => {
            assert!(context.contains("connected 2 times"), "{context}");
        }
        other => panic!("expected InvalidGraph, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_cycle_without_breaking_stage_is_rejected() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let mut builder = GraphDsl::new();
    let (source, _) = builder.add_source(Source::single(1));
    let (merge, _) = builder.add_stage(Merge::<i32>::new(2));
    let (broadcast, _) = builder.add_stage(Broadcast::<i32>::new(2));
    let (feedback, _) = builder.add_flow(Flow::<i32>::new().map(|x| x + 1));
    let (sink, _) = builder.add_sink(Sink::ignore());
    builder.connect(source, merge.inlets[0]);
    builder.connect(merge.out, broadcast.inlet);
    builder.connect(broadcast.outlets[0], feedback.inlet);
    builder.connect(feedback.outlet, merge.inlets[1]);
    builder.connect(broadcast.outlets[1], sink);

    // Act
    let result = builder.build_closed().run_with(&materializer);

    // Assert
    match result {
        Err(StreamError::InvalidGraph { context }) => {
            assert!(context.contains("cycle"), "{context}");
        }
        other => panic!("expected InvalidGraph, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_push_without_demand_is_a_protocol_violation() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::<i32>::from_graph_stage(Eager).named("eager");

    // Act
    let result = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await;

    // Assert
    match result {
        Err(StreamError::ProtocolViolation { context }) => {
            assert!(context.contains("without demand"), "{context}");
            assert!(context.contains("eager"), "{context}");
        }
        other => panic!("expected ProtocolViolation, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_shut_down_materializer_refuses_new_graphs() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let running = Source::repeat(1).run_with(Sink::ignore(), &materializer)?;

    // Act
    materializer.shutdown();
    let stopped = await_within(1_000, running).await;
    let refused = Source::single(1).run_with(Sink::ignore(), &materializer);

    // Assert
    assert!(materializer.is_shutdown());
    assert!(matches!(stopped, Err(ref e) if e.is_abrupt_termination()));
    assert!(matches!(refused, Err(ref e) if e.is_abrupt_termination()));
    Ok(())
}

#[tokio::test]
async fn test_blueprint_materializes_independently() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let graph = Source::from_iter(1..=4)
        .map(|x| x * x)
        .named("squares")
        .to_mat(Sink::fold(0, |acc, x| acc + x), Keep::right);

    // Act
    let first = graph.run_with(&materializer)?;
    let second = graph.run_with(&materializer)?;

    // Assert
    assert_eq!(await_within(1_000, first).await?, 30);
    assert_eq!(await_within(1_000, second).await?, 30);
    Ok(())
}

#[tokio::test]
async fn test_input_buffer_attribute_keeps_results() -> anyhow::Result<()> {
    // Arrange
    let materializer = Materializer::new()?;
    let source = Source::from_iter(1..=50)
        .async_boundary()
        .map(|x| x * 2)
        .with_attributes(Attributes::input_buffer(1, 1));

    // Act
    let doubled = await_within(1_000, source.run_with(Sink::seq(), &materializer)?).await?;

    // Assert
    assert_eq!(doubled, (1..=50).map(|x| x * 2).collect::<Vec<_>>());
    Ok(())
}
