use crate::models::Candle;

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    if period == 0 || n < period {
        return vec![0.0; n];
    }

    let mut sma_values = vec![0.0; period - 1];
    sma_values.reserve(n - period + 1);

    let mut window_sum: f64 = values[..period].iter().sum();
    sma_values.push(window_sum / period as f64);
    for i in period..n {
        window_sum += values[i] - values[i - period];
        sma_values.push(window_sum / period as f64);
    }

    sma_values
}

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };

    let multiplier = 2.0 / (period as f64 + 1.0);
    values
        .iter()
        .skip(1)
        .scan(first, |previous, &value| {
            *previous = (value * multiplier) + (*previous * (1.0 - multiplier));
            Some(*previous)
        })
        .fold(vec![first], |mut acc, ema| {
            acc.push(ema);
            acc
        })
}

/// Running Wilder average: each new sample carries weight `1/period`.
#[derive(Clone, Copy, Debug)]
struct WilderAverage {
    value: f64,
    period: f64,
}

impl WilderAverage {
    fn seeded(samples: &[f64]) -> Self {
        let period = samples.len() as f64;
        Self {
            value: samples.iter().sum::<f64>() / period,
            period,
        }
    }

    fn step(self, sample: f64) -> Self {
        Self {
            value: (self.value * (self.period - 1.0) + sample) / self.period,
            period: self.period,
        }
    }
}

/// Running Wilder sum used by the directional movement system: `s - s/period + x`.
#[derive(Clone, Copy, Debug)]
struct WilderSum {
    value: f64,
    period: f64,
}

impl WilderSum {
    fn seeded(samples: &[f64]) -> Self {
        Self {
            value: samples.iter().sum(),
            period: samples.len() as f64,
        }
    }

    fn step(self, sample: f64) -> Self {
        Self {
            value: self.value - (self.value / self.period) + sample,
            period: self.period,
        }
    }
}

fn oscillator_from_ratio(up: f64, down: f64) -> f64 {
    if down == 0.0 {
        100.0
    } else {
        let ratio = up / down;
        100.0 - (100.0 / (1.0 + ratio))
    }
}

/// Wilder RSI over closes. Indices `0..period` hold the 0 sentinel.
pub fn calculate_rsi(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return vec![0.0; n];
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = candles
        .windows(2)
        .map(|pair| {
            let delta = pair[1].close - pair[0].close;
            (delta.max(0.0), (-delta).max(0.0))
        })
        .unzip();

    let seed = (
        WilderAverage::seeded(&gains[..period]),
        WilderAverage::seeded(&losses[..period]),
    );

    let mut rsi_values = vec![0.0; period];
    rsi_values.push(oscillator_from_ratio(seed.0.value, seed.1.value));
    rsi_values.extend(
        gains[period..]
            .iter()
            .zip(&losses[period..])
            .scan(seed, |(avg_gain, avg_loss), (&gain, &loss)| {
                *avg_gain = avg_gain.step(gain);
                *avg_loss = avg_loss.step(loss);
                Some(oscillator_from_ratio(avg_gain.value, avg_loss.value))
            }),
    );

    rsi_values
}

/// Money Flow Index. Indices `0..period` hold the 0 sentinel.
pub fn calculate_mfi(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return vec![0.0; n];
    }

    let typical_prices: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
    // Flow at index i compares candle i with candle i - 1; index 0 has no flow.
    let mut positive_flow = vec![0.0; n];
    let mut negative_flow = vec![0.0; n];
    for i in 1..n {
        let raw_flow = typical_prices[i] * candles[i].volume;
        if typical_prices[i] > typical_prices[i - 1] {
            positive_flow[i] = raw_flow;
        } else {
            negative_flow[i] = raw_flow;
        }
    }

    let mut mfi_values = vec![0.0; n];
    for (i, mfi_value) in mfi_values.iter_mut().enumerate().skip(period) {
        let window_start = i + 1 - period;
        let positive_sum: f64 = positive_flow[window_start..=i].iter().sum();
        let negative_sum: f64 = negative_flow[window_start..=i].iter().sum();
        *mfi_value = oscillator_from_ratio(positive_sum, negative_sum);
    }

    mfi_values
}

fn true_range(candle: &Candle, previous_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - previous_close).abs())
        .max((candle.low - previous_close).abs())
}

/// True range per candle; the first candle has no previous close and uses high - low.
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            if i == 0 {
                candle.range()
            } else {
                true_range(candle, candles[i - 1].close)
            }
        })
        .collect()
}

/// Wilder ATR. The first value (index `period - 1`) is the simple mean of the
/// first `period` true ranges; earlier indices hold the 0 sentinel.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![0.0; n];
    }

    let tr_values = true_ranges(candles);
    let seed = WilderAverage::seeded(&tr_values[..period]);

    let mut atr_values = vec![0.0; period - 1];
    atr_values.push(seed.value);
    atr_values.extend(tr_values[period..].iter().scan(seed, |atr, &tr| {
        *atr = atr.step(tr);
        Some(atr.value)
    }));

    atr_values
}

/// Commodity Channel Index over typical price; 0 during warm-up or when the
/// mean deviation is 0.
pub fn calculate_cci(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![0.0; n];
    }

    let typical_prices: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
    let sma_tp = calculate_sma(&typical_prices, period);

    let mut cci_values = vec![0.0; n];
    for (i, cci_value) in cci_values.iter_mut().enumerate().skip(period - 1) {
        let mean = sma_tp[i];
        let window = &typical_prices[i + 1 - period..=i];
        let mean_deviation =
            window.iter().map(|value| (value - mean).abs()).sum::<f64>() / period as f64;
        if mean_deviation != 0.0 {
            *cci_value = (typical_prices[i] - mean) / (0.015 * mean_deviation);
        }
    }

    cci_values
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DmiOutput {
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
    pub adx: Vec<f64>,
}

impl DmiOutput {
    fn zeros(n: usize) -> Self {
        Self {
            plus_di: vec![0.0; n],
            minus_di: vec![0.0; n],
            adx: vec![0.0; n],
        }
    }
}

/// Directional movement system. DI values start at index `period + 1`, ADX at
/// index `2 * period`; everything before is the 0 sentinel.
pub fn calculate_dmi(candles: &[Candle], period: usize) -> DmiOutput {
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return DmiOutput::zeros(n);
    }

    let mut tr_values = Vec::with_capacity(n - 1);
    let mut plus_dm_values = Vec::with_capacity(n - 1);
    let mut minus_dm_values = Vec::with_capacity(n - 1);
    for pair in candles.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        tr_values.push(true_range(current, previous.close));

        let up_move = current.high - previous.high;
        let down_move = previous.low - current.low;
        plus_dm_values.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm_values.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let mut output = DmiOutput::zeros(n);
    let mut smoothed = (
        WilderSum::seeded(&tr_values[..period]),
        WilderSum::seeded(&plus_dm_values[..period]),
        WilderSum::seeded(&minus_dm_values[..period]),
    );

    let mut dx_values = Vec::with_capacity(tr_values.len().saturating_sub(period));
    for k in period..tr_values.len() {
        smoothed = (
            smoothed.0.step(tr_values[k]),
            smoothed.1.step(plus_dm_values[k]),
            smoothed.2.step(minus_dm_values[k]),
        );
        let (atr, plus_dm, minus_dm) = (smoothed.0.value, smoothed.1.value, smoothed.2.value);
        let (plus_di, minus_di) = if atr != 0.0 {
            (100.0 * plus_dm / atr, 100.0 * minus_dm / atr)
        } else {
            (0.0, 0.0)
        };

        // True range k belongs to candle k + 1.
        output.plus_di[k + 1] = plus_di;
        output.minus_di[k + 1] = minus_di;

        let di_sum = plus_di + minus_di;
        dx_values.push(if di_sum != 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        });
    }

    if dx_values.len() >= period {
        let seed = WilderAverage::seeded(&dx_values[..period]);
        let first_index = 2 * period;
        output.adx[first_index] = seed.value;
        let mut adx = seed;
        for (offset, &dx) in dx_values[period..].iter().enumerate() {
            adx = adx.step(dx);
            output.adx[first_index + 1 + offset] = adx.value;
        }
    }

    output
}
