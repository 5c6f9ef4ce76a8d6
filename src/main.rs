/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use stak::tak::{format_move, format_tps, Color, Position};
use stak::{make_evaluator, Args, Minimax, MinimaxConfig, SearchLimits, Stats, Weights};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let position = match &args.position {
        Some(tps) => tps.parse::<Position>().context("parsing TPS position")?,
        None => Position::new(args.size)?,
    };

    let mut config = MinimaxConfig {
        size: position.size(),
        depth: args.depth,
        seed: args.seed,
        debug: args.debug,
        randomize_window: args.randomize,
        randomize_scale: args.randomize_scale,
        no_sort: args.no_sort,
        no_table: args.no_table,
        no_null_move: args.no_null_move,
        no_extend_forces: args.no_extend_forces,
        no_reduce_slides: args.no_reduce_slides,
        no_multi_cut: args.no_multi_cut,
        ..MinimaxConfig::default()
    };
    if args.precise {
        config.make_precise();
    }
    if let Some(js) = &args.weights {
        let weights: Weights = serde_json::from_str(js).context("parsing --weights JSON")?;
        config.evaluate = Some(make_evaluator(position.size(), Some(&weights)));
    }

    let mut engine = Minimax::new(config);

    if args.evaluate {
        let mut value = engine.evaluate(&position);
        // Report from White's perspective, like the board diagram.
        if position.to_move() == Color::Black {
            value = -value;
        }
        println!("value={value}");
        return Ok(());
    }

    let limits = match args.limit {
        Some(secs) => SearchLimits::from_duration(Duration::from_secs_f64(secs)),
        None => SearchLimits::none(),
    };

    if !args.quiet {
        println!("{position}");
        println!();
    }

    if args.all {
        let (lines, value, stats) = engine.analyze_all(&limits, &position)?;
        println!("value={value}");
        for line in &lines {
            println!("  pv={}", stak::format_pv(line));
        }
        print_stats(&args, &stats);
        return Ok(());
    }

    let analysis = engine.analyze(&limits, &position)?;
    print!("pv=");
    for m in &analysis.pv {
        print!("{} ", format_move(m));
    }
    println!();
    println!("value={}", analysis.value);
    if args.print_tps {
        println!("[TPS \"{}\"]", format_tps(&position));
    }
    print_stats(&args, &analysis.stats);

    // Walk the PV so an illegal line is caught loudly.
    let mut current = position;
    for m in &analysis.pv {
        match current.make_move(m) {
            Ok(next) => current = next,
            Err(err) => {
                eprintln!("illegal move in pv: {}: {err}", format_move(m));
                if !analysis.value.is_decisive() {
                    anyhow::bail!("illegal move in a non-terminal pv");
                }
                return Ok(());
            }
        }
    }
    if !args.quiet && !analysis.pv.is_empty() {
        println!();
        println!("Resulting position:");
        println!("{current}");
    }
    Ok(())
}

fn print_stats(args: &Args, st: &Stats) {
    if args.debug < 1 {
        return;
    }
    println!(
        "depth={} evaluated={} visited={} cancelled={} elapsed={:?}",
        st.depth, st.evaluated, st.visited, st.cancelled, st.elapsed
    );
    if args.debug > 1 {
        println!(
            "cut={} cut0={} cut1={} research={} tt={}/{} null={}/{} mc={}/{} rslide={}",
            st.cut_nodes,
            st.cut0,
            st.cut1,
            st.re_search,
            st.tt_shortcut,
            st.tt_hits,
            st.null_cut,
            st.null_search,
            st.mc_cut,
            st.mc_search,
            st.reduced_slides,
        );
    }
}
