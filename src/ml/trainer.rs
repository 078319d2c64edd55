// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One generic loop for every reader model:
//
//   for epoch in 1..=max_epochs
//     shuffle batch order (seeded)
//     for batch
//       every hook: before_batch(examples)
//       forward pass → loss
//       non-finite loss → abort with NumericDivergence
//       backward pass + Adam update
//       every hook: on_iteration(epoch, iteration, loss)
//     every hook: on_epoch_end(epoch, mean loss)
//     evaluating hooks: on_evaluation(epoch, snapshot of the weights)
//
// Evaluation only reports. There is no early stopping and the
// number of passes is fixed.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::traits::{Predictor, TrainingHook};
use crate::domain::training::{OptimizerConfig, TrainingSummary};
use crate::error::{ReaderError, Result};

/// A model that can score its own supervised loss on a batch.
pub trait SupervisedModel<B: AutodiffBackend>: AutodiffModule<B> {
    type Batch: Clone;

    fn forward_loss(&self, batch: Self::Batch) -> Tensor<B, 1>;

    fn batch_len(batch: &Self::Batch) -> usize;
}

/// Adam with optional L2 decay and gradient value clipping.
pub fn adam_config(optimizer: &OptimizerConfig) -> AdamConfig {
    AdamConfig::new()
        .with_epsilon(1e-8)
        .with_weight_decay(optimizer.l2.map(WeightDecayConfig::new))
        .with_grad_clipping(optimizer.clip_value.map(|c| GradientClippingConfig::Value(c.abs())))
}

/// Train `model` for `max_epochs` passes over `batches`.
///
/// `snapshot` turns the weights at the end of an epoch into a
/// predictor for the evaluating hooks.
pub fn fit<B, M, F, P>(
    mut model:  M,
    batches:    &[M::Batch],
    optimizer:  &OptimizerConfig,
    hooks:      &mut [Box<dyn TrainingHook>],
    max_epochs: usize,
    seed:       u64,
    snapshot:   F,
) -> Result<(M, TrainingSummary)>
where
    B: AutodiffBackend,
    M: SupervisedModel<B>,
    F: Fn(&M) -> P,
    P: Predictor,
{
    if batches.is_empty() {
        return Err(ReaderError::InvalidArgument("training set produced no batches".into()));
    }

    let mut optim   = adam_config(optimizer).init::<B, M>();
    let mut rng     = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..batches.len()).collect();
    let mut summary = TrainingSummary::default();

    for epoch in 1..=max_epochs {
        order.shuffle(&mut rng);
        let mut loss_sum = 0.0f64;

        for &index in &order {
            let batch    = batches[index].clone();
            let examples = M::batch_len(&batch);
            tracing::trace!("epoch {} batch {} ({} examples)", epoch, index, examples);
            for hook in hooks.iter_mut() {
                hook.before_batch(examples);
            }

            let loss = model.forward_loss(batch);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            summary.iterations += 1;

            if !loss_val.is_finite() {
                return Err(ReaderError::NumericDivergence {
                    epoch,
                    iteration: summary.iterations,
                    loss: loss_val,
                });
            }

            // Backward pass + Adam update
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(optimizer.learning_rate, model, grads);
            loss_sum += loss_val;

            for hook in hooks.iter_mut() {
                hook.on_iteration(epoch, summary.iterations, loss_val);
            }
        }

        let mean_loss = loss_sum / batches.len() as f64;
        summary.epoch_losses.push(mean_loss);
        tracing::debug!("Epoch {:>3}/{} | loss={:.4}", epoch, max_epochs, mean_loss);

        for hook in hooks.iter_mut() {
            hook.on_epoch_end(epoch, mean_loss);
        }

        if hooks.iter().any(|h| h.evaluates()) {
            let predictor = snapshot(&model);
            for hook in hooks.iter_mut().filter(|h| h.evaluates()) {
                hook.on_evaluation(epoch, &predictor);
            }
        }
    }

    Ok((model, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
    };
    use std::{cell::RefCell, rc::Rc};

    use crate::domain::qa_setting::{Answer, QaSetting};
    use crate::domain::traits::ReaderKind;

    type TestBackend = Autodiff<NdArray>;

    /// Stands in for a reader view; answers nothing.
    struct Silent;

    impl Predictor for Silent {
        fn reader_kind(&self) -> ReaderKind {
            ReaderKind::FastQa
        }

        fn predict(&self, inputs: &[QaSetting]) -> Result<Vec<Vec<Answer>>> {
            Ok(vec![Vec::new(); inputs.len()])
        }
    }

    fn silent<M>(_: &M) -> Silent {
        Silent
    }

    /// y = w·x regression used to exercise the loop without a real reader.
    #[derive(Module, Debug)]
    struct Regressor<B: Backend> {
        linear: Linear<B>,
    }

    impl<B: AutodiffBackend> SupervisedModel<B> for Regressor<B> {
        type Batch = (Tensor<B, 2>, Tensor<B, 2>);

        fn forward_loss(&self, (x, y): Self::Batch) -> Tensor<B, 1> {
            let diff = self.linear.forward(x) - y;
            (diff.clone() * diff).mean()
        }

        fn batch_len(batch: &Self::Batch) -> usize {
            batch.0.dims()[0]
        }
    }

    fn batches(device: &<TestBackend as Backend>::Device, scale: f32) -> Vec<(Tensor<TestBackend, 2>, Tensor<TestBackend, 2>)> {
        (0..3)
            .map(|i| {
                let x = Tensor::from_data(TensorData::new(vec![i as f32, 1.0], [1, 2]), device);
                let y = Tensor::from_data(TensorData::new(vec![scale * i as f32], [1, 1]), device);
                (x, y)
            })
            .collect()
    }

    struct Recorder {
        calls: Rc<RefCell<Vec<(usize, usize, &'static str)>>>,
        name:  &'static str,
    }

    impl TrainingHook for Recorder {
        fn on_iteration(&mut self, epoch: usize, iteration: usize, _loss: f64) {
            self.calls.borrow_mut().push((epoch, iteration, self.name));
        }
    }

    #[test]
    fn test_hooks_run_in_registration_order_every_batch() {
        let device = Default::default();
        let model = Regressor::<TestBackend> { linear: LinearConfig::new(2, 1).init(&device) };
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut hooks: Vec<Box<dyn TrainingHook>> = vec![
            Box::new(Recorder { calls: calls.clone(), name: "first" }),
            Box::new(Recorder { calls: calls.clone(), name: "second" }),
        ];

        let (_, summary) = fit(
            model,
            &batches(&device, 2.0),
            &OptimizerConfig::with_learning_rate(0.01),
            &mut hooks,
            2,
            7,
            silent,
        )
        .unwrap();

        assert_eq!(summary.iterations, 6);
        assert_eq!(summary.epoch_losses.len(), 2);
        let calls = calls.borrow();
        assert_eq!(calls.len(), 12);
        assert_eq!(calls[0], (1, 1, "first"));
        assert_eq!(calls[1], (1, 1, "second"));
        assert_eq!(calls[11], (2, 6, "second"));
    }

    #[test]
    fn test_loss_goes_down_on_a_learnable_problem() {
        let device = Default::default();
        let model = Regressor::<TestBackend> { linear: LinearConfig::new(2, 1).init(&device) };
        let (_, summary) = fit(
            model,
            &batches(&device, 2.0),
            &OptimizerConfig::with_learning_rate(0.05),
            &mut [],
            40,
            1,
            silent,
        )
        .unwrap();
        assert!(summary.final_loss().unwrap() < summary.first_loss().unwrap());
    }

    #[test]
    fn test_non_finite_loss_surfaces_as_divergence() {
        let device = Default::default();
        let model = Regressor::<TestBackend> { linear: LinearConfig::new(2, 1).init(&device) };
        let err = fit(
            model,
            &batches(&device, f32::NAN),
            &OptimizerConfig::default(),
            &mut [],
            1,
            1,
            silent,
        )
        .unwrap_err();
        assert!(matches!(err, ReaderError::NumericDivergence { epoch: 1, .. }));
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let device = Default::default();
        let model = Regressor::<TestBackend> { linear: LinearConfig::new(2, 1).init(&device) };
        let err = fit(model, &[], &OptimizerConfig::default(), &mut [], 1, 1, silent).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidArgument(_)));
    }

    /// Records batch sizes and evaluation calls.
    #[derive(Default)]
    struct Watcher {
        batches: Rc<RefCell<Vec<usize>>>,
        evals:   Rc<RefCell<Vec<(usize, ReaderKind, usize)>>>,
    }

    impl TrainingHook for Watcher {
        fn before_batch(&mut self, examples: usize) {
            self.batches.borrow_mut().push(examples);
        }

        fn on_iteration(&mut self, _epoch: usize, _iteration: usize, _loss: f64) {}

        fn evaluates(&self) -> bool {
            true
        }

        fn on_evaluation(&mut self, epoch: usize, predictor: &dyn Predictor) {
            let answered = predictor.predict(&[QaSetting::new("q", vec![])]).unwrap().len();
            self.evals.borrow_mut().push((epoch, predictor.reader_kind(), answered));
        }
    }

    #[test]
    fn test_evaluating_hooks_see_every_epoch_and_batch() {
        let device  = Default::default();
        let model   = Regressor::<TestBackend> { linear: LinearConfig::new(2, 1).init(&device) };
        let watcher = Watcher::default();
        let (batch_log, eval_log) = (watcher.batches.clone(), watcher.evals.clone());
        let mut hooks: Vec<Box<dyn TrainingHook>> = vec![Box::new(watcher)];

        fit(model, &batches(&device, 2.0), &OptimizerConfig::default(), &mut hooks, 3, 5, silent).unwrap();

        assert_eq!(*batch_log.borrow(), vec![1; 9]);
        assert_eq!(
            *eval_log.borrow(),
            vec![(1, ReaderKind::FastQa, 1), (2, ReaderKind::FastQa, 1), (3, ReaderKind::FastQa, 1)]
        );
    }

    #[test]
    fn test_adam_config_carries_decay_and_clipping() {
        let plain = serde_json::to_value(adam_config(&OptimizerConfig::default())).unwrap();
        assert!(plain["weight_decay"].is_null());
        assert!(plain["grad_clipping"].is_null());

        let tuned = OptimizerConfig { learning_rate: 0.05, l2: Some(0.01), clip_value: Some(-0.5) };
        let value = serde_json::to_value(adam_config(&tuned)).unwrap();
        let penalty = value["weight_decay"]["penalty"].as_f64().unwrap();
        assert!((penalty - 0.01).abs() < 1e-6);
        assert_eq!(value["grad_clipping"], serde_json::json!({ "Value": 0.5 }));
    }

    #[test]
    fn test_decay_and_clipping_still_learn() {
        let device = Default::default();
        let model = Regressor::<TestBackend> { linear: LinearConfig::new(2, 1).init(&device) };
        let tuned = OptimizerConfig { learning_rate: 0.05, l2: Some(1e-4), clip_value: Some(1.0) };
        let (_, summary) = fit(model, &batches(&device, 2.0), &tuned, &mut [], 40, 1, silent).unwrap();
        assert!(summary.final_loss().unwrap() < summary.first_loss().unwrap());
    }
}
