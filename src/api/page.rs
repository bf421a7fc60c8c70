/// Static driver page served at `/`.
pub const CONTROL_PAGE: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Rover Control</title>
  <style>
    body { text-align: center; font-family: sans-serif; background: #f0f0f0; }
    #video { margin: 20px auto; border: 5px solid #333; display: inline-block; }
    #video img { width: 100%; max-width: 640px; height: auto; display: block; }
    .controls { display: grid; grid-template-columns: repeat(3, 1fr); gap: 10px; max-width: 300px; margin: 20px auto; }
    button { padding: 15px; font-size: 18px; background: #007bff; color: #fff; border: none; border-radius: 5px; }
    button:active { background: #0056b3; }
    .fwd { grid-column: 2; grid-row: 1; }
    .left { grid-column: 1; grid-row: 2; }
    .stop { grid-column: 2; grid-row: 2; background: #dc3545; }
    .right { grid-column: 3; grid-row: 2; }
    .back { grid-column: 2; grid-row: 3; }
    #status { color: #555; font-size: 14px; }
  </style>
</head>
<body>
  <h1>Rover Control</h1>
  <div id="video"><img src="/video_feed" alt="camera stream"></div>
  <div class="controls">
    <button class="fwd" data-cmd="forward">&#9650;</button>
    <button class="left" data-cmd="left">&#9664;</button>
    <button class="stop" data-cmd="stop">STOP</button>
    <button class="right" data-cmd="right">&#9654;</button>
    <button class="back" data-cmd="backward">&#9660;</button>
  </div>
  <div id="status"></div>
  <script>
    const status = document.getElementById('status');
    function send(cmd) {
      fetch('/' + cmd)
        .then(r => r.text())
        .then(t => { status.textContent = t; })
        .catch(e => { status.textContent = 'error: ' + e; });
    }
    document.querySelectorAll('button[data-cmd]').forEach(b => {
      b.addEventListener('click', () => send(b.dataset.cmd));
    });
    const keys = { ArrowUp: 'forward', ArrowDown: 'backward', ArrowLeft: 'left', ArrowRight: 'right', ' ': 'stop' };
    document.addEventListener('keydown', e => { if (keys[e.key] && !e.repeat) send(keys[e.key]); });
  </script>
</body>
</html>
"#;
